// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mercurial adapter.
//!
//! Branches are named branches as reported by `hg branches`. Remote
//! repositories are cloned without a working copy into scratch space first.

use crate::{
    config::Config,
    job::JobError,
    rules::Settings,
    scm::{name_safe, scm_section, syscall_non_interactive, Result, Scm, ScmKind},
    xml,
};

use indexmap::IndexMap;
use std::{ffi::OsStr, path::Path};
use tracing::instrument;
use xmltree::Element;

/// Mercurial adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hg;

impl Hg {
    /// Construct new mercurial adapter.
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self), level = "debug")]
    fn list_local(&self, path: &Path) -> Result<Vec<String>> {
        let output = syscall_non_interactive(
            "hg",
            [
                OsStr::new("branches"),
                OsStr::new("-c"),
                OsStr::new("-R"),
                path.as_os_str(),
                OsStr::new("-T"),
                OsStr::new("{branch}\\n"),
            ],
        )?;

        Ok(parse_branches(&output))
    }

    #[instrument(skip(self), level = "debug")]
    fn list_remote(&self, url: &str) -> Result<Vec<String>> {
        let scratch = tempfile::tempdir()?;
        let clone = scratch.path().join("clone");
        syscall_non_interactive(
            "hg",
            [
                OsStr::new("clone"),
                OsStr::new("-U"),
                OsStr::new(url),
                clone.as_os_str(),
            ],
        )?;

        self.list_local(&clone)
    }
}

fn parse_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Scm for Hg {
    fn kind(&self) -> ScmKind {
        ScmKind::Hg
    }

    fn list_branches(&self, config: &Config) -> Result<Vec<String>> {
        let path = Path::new(&config.repo);
        if path.is_dir() {
            self.list_local(path)
        } else {
            self.list_remote(&config.repo)
        }
    }

    fn placeholders(
        &self,
        branch: &str,
        config: &Config,
        settings: &Settings,
    ) -> IndexMap<String, String> {
        IndexMap::from([
            ("branch".to_string(), name_safe(branch, settings)),
            ("repo".to_string(), name_safe(&config.repo, settings)),
            ("branch-orig".to_string(), branch.to_string()),
            ("repo-orig".to_string(), config.repo.clone()),
        ])
    }

    fn configure(
        &self,
        document: &mut Element,
        branch: &str,
        _config: &Config,
    ) -> Result<(), JobError> {
        let scm = scm_section(document, ScmKind::Hg)?;
        let element = xml::find_descendant_mut(scm, &|el: &Element| el.name == "branch")
            .ok_or_else(|| JobError::MissingElement {
                element: "branch".into(),
            })?;
        xml::set_text(element, branch);

        Ok(())
    }
}
