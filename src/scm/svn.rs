// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Subversion adapter.
//!
//! Branches are directory paths relative to the repository root, such as
//! `branches/feature-one`. The URLs to list come from the `branches` setting.
//! A `*` in one of those URLs expands to every directory at that level, so
//! `<repo>/experimental/*/` lists the branch directories of each
//! experimental area.

use crate::{
    config::Config,
    job::JobError,
    rules::Settings,
    scm::{name_safe, scm_section, syscall_non_interactive, Result, Scm, ScmError, ScmKind},
    xml,
};

use indexmap::IndexMap;
use tracing::{instrument, warn};
use xmltree::Element;

/// Subversion adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Svn;

impl Svn {
    /// Construct new subversion adapter.
    pub fn new() -> Self {
        Self
    }

    /// List directories directly under URL.
    #[instrument(skip(self, config), level = "debug")]
    fn ls(&self, url: &str, config: &Config) -> Result<Vec<String>> {
        let mut args = vec![
            "ls".to_string(),
            "--trust-server-cert".to_string(),
            "--non-interactive".to_string(),
        ];
        if let Some(username) = &config.scm_username {
            args.extend(["--username".to_string(), username.clone()]);
        }
        if let Some(password) = &config.scm_password {
            args.extend(["--password".to_string(), password.clone()]);
        }
        args.push(url.to_string());

        let output = syscall_non_interactive("svn", args)?;
        Ok(directories(&output))
    }

    /// List directory URLs under URL, expanding wildcards one level at a
    /// time.
    ///
    /// Unreadable paths yield nothing.
    fn wildcard_ls(&self, url: &str, config: &Config) -> Result<Vec<String>> {
        let Some((left, right)) = url.split_once('*') else {
            return match self.ls(url, config) {
                Ok(entries) => Ok(entries.iter().map(|entry| join(url, entry)).collect()),
                Err(ScmError::CommandFailed { command, message }) => {
                    warn!("cannot list {url}: {command} failed: {message}");
                    Ok(Vec::new())
                }
                Err(error) => Err(error),
            };
        };

        let right = right.trim_start_matches('/');
        let mut urls = Vec::new();
        for dirname in self.ls(left, config)? {
            let url = join(&join(left, &dirname), right);
            urls.extend(self.wildcard_ls(&url, config)?);
        }

        Ok(urls)
    }
}

fn directories(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix('/'))
        .map(ToString::to_string)
        .collect()
}

fn join(base: &str, segment: &str) -> String {
    match (base.is_empty(), segment.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => segment.to_string(),
        (false, false) => format!("{}/{}", base.trim_end_matches('/'), segment),
    }
}

fn relative_to(url: &str, repo: &str) -> String {
    url.strip_prefix(repo.trim_end_matches('/'))
        .unwrap_or(url)
        .trim_matches('/')
        .to_string()
}

impl Scm for Svn {
    fn kind(&self) -> ScmKind {
        ScmKind::Svn
    }

    fn list_branches(&self, config: &Config) -> Result<Vec<String>> {
        let mut branches = Vec::new();
        for url in &config.branches {
            let urls = if url.contains('*') {
                self.wildcard_ls(url, config)?
            } else {
                let entries = self.ls(url, config)?;
                entries.iter().map(|entry| join(url, entry)).collect()
            };
            branches.extend(urls.iter().map(|url| relative_to(url, &config.repo)));
        }

        Ok(branches)
    }

    fn placeholders(
        &self,
        branch: &str,
        config: &Config,
        settings: &Settings,
    ) -> IndexMap<String, String> {
        let last = branch.rsplit('/').next().unwrap_or(branch);
        IndexMap::from([
            ("branch".to_string(), name_safe(last, settings)),
            ("path".to_string(), name_safe(branch, settings)),
            ("repo".to_string(), name_safe(&config.repo, settings)),
            ("branch-orig".to_string(), last.to_string()),
            ("path-orig".to_string(), branch.to_string()),
            ("repo-orig".to_string(), config.repo.clone()),
        ])
    }

    fn configure(
        &self,
        document: &mut Element,
        branch: &str,
        config: &Config,
    ) -> Result<(), JobError> {
        let scm = scm_section(document, ScmKind::Svn)?;
        let remote = xml::find_descendant_mut(scm, &|el: &Element| el.name == "remote")
            .ok_or_else(|| JobError::MissingElement {
                element: "remote".into(),
            })?;
        xml::set_text(remote, join(&config.repo, branch));

        let local = xml::find_descendant_mut(scm, &|el: &Element| el.name == "local")
            .ok_or_else(|| JobError::MissingElement {
                element: "local".into(),
            })?;
        xml::set_text(local, ".");

        Ok(())
    }
}
