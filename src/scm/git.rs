// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git adapter.
//!
//! Branches are full ref names such as `refs/heads/feature/one`. Local
//! repositories are read directly, remote ones are asked for their advertised
//! refs without fetching any objects.

use crate::{
    config::Config,
    job::JobError,
    rules::Settings,
    scm::{name_safe, scm_section, Result, Scm, ScmKind},
    xml,
};

use auth_git2::GitAuthenticator;
use git2::{Direction, Remote, RemoteCallbacks, Repository};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, instrument};
use xmltree::Element;

const SHORTREF_PREFIXES: [&str; 3] = ["refs/heads/", "refs/tags/", "refs/remotes/"];

/// Git adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git;

impl Git {
    /// Construct new git adapter.
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self), level = "debug")]
    fn list_local(&self, path: &Path) -> Result<Vec<String>> {
        let repository = Repository::open(path)?;
        let mut refs = Vec::new();
        for reference in repository.references()? {
            let reference = reference?;
            if let Some(name) = reference.name() {
                refs.push(name.to_string());
            }
        }

        Ok(refs)
    }

    #[instrument(skip(self, config), level = "debug")]
    fn list_remote(&self, url: &str, config: &Config) -> Result<Vec<String>> {
        let mut authenticator = GitAuthenticator::default();
        if let (Some(username), Some(password)) = (&config.scm_username, &config.scm_password) {
            authenticator = authenticator.add_plaintext_credentials("*", username, password);
        }
        let git_config = git2::Config::open_default()?;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(authenticator.credentials(&git_config));

        let mut remote = Remote::create_detached(url)?;
        let connection = remote.connect_auth(Direction::Fetch, Some(callbacks), None)?;
        let refs = connection
            .list()?
            .iter()
            .map(|head| head.name().to_string())
            .filter(|name| name.starts_with("refs/") && !name.ends_with("^{}"))
            .collect();

        Ok(refs)
    }
}

/// Strip well-known namespace from a ref name.
pub fn shortref(reference: &str) -> &str {
    SHORTREF_PREFIXES
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))
        .unwrap_or(reference)
}

impl Scm for Git {
    fn kind(&self) -> ScmKind {
        ScmKind::Git
    }

    fn list_branches(&self, config: &Config) -> Result<Vec<String>> {
        let path = Path::new(&config.repo);
        let refs = if path.is_dir() {
            self.list_local(path)?
        } else {
            self.list_remote(&config.repo, config)?
        };
        debug!("found {} refs in {:?}", refs.len(), config.repo);

        Ok(refs)
    }

    fn placeholders(
        &self,
        branch: &str,
        config: &Config,
        settings: &Settings,
    ) -> IndexMap<String, String> {
        let short = shortref(branch);
        IndexMap::from([
            ("ref".to_string(), name_safe(branch, settings)),
            ("shortref".to_string(), name_safe(short, settings)),
            ("repo".to_string(), name_safe(&config.repo, settings)),
            ("ref-orig".to_string(), branch.to_string()),
            ("shortref-orig".to_string(), short.to_string()),
            ("repo-orig".to_string(), config.repo.clone()),
        ])
    }

    fn configure(
        &self,
        document: &mut Element,
        branch: &str,
        _config: &Config,
    ) -> Result<(), JobError> {
        let short = shortref(branch);
        let scm = scm_section(document, ScmKind::Git)?;

        let mut found = 0;
        xml::for_each_named_mut(scm, "hudson.plugins.git.BranchSpec", &mut |spec: &mut Element| {
            if let Some(name) = spec.get_mut_child("name") {
                xml::set_text(name, short);
                found += 1;
            }
        });
        if found == 0 {
            return Err(JobError::MissingElement {
                element: "hudson.plugins.git.BranchSpec/name".into(),
            });
        }

        // INVARIANT: Local branch keeps the unsanitized short ref, slashes included.
        match xml::find_descendant_mut(scm, &|el: &Element| el.name == "localBranch") {
            Some(local) => xml::set_text(local, short),
            None => xml::set_text(xml::child_or_insert(scm, "localBranch"), short),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{RawConfig, RunOptions},
        xml,
    };
    use indoc::indoc;
    use simple_test_case::test_case;

    fn config() -> Config {
        let raw: RawConfig = indoc! {r#"
            repo: /srv/git/project.git
            jenkins: http://127.0.0.1:8080
            template: master-job-git
            namesep: '.'
            sanitize:
              '#': '_'
        "#}
        .parse()
        .unwrap();
        raw.compile(ScmKind::Git, &RunOptions::default()).unwrap()
    }

    #[test_case("refs/heads/feature/one", "feature/one"; "heads")]
    #[test_case("refs/tags/v1.0", "v1.0"; "tags")]
    #[test_case("refs/remotes/origin/main", "origin/main"; "remotes")]
    #[test_case("refs/notes/commits", "refs/notes/commits"; "other namespace")]
    #[test]
    fn shortref_strips_namespace(reference: &str, expect: &str) {
        pretty_assertions::assert_eq!(shortref(reference), expect);
    }

    #[test]
    fn placeholders_sanitize_and_separate() {
        let config = config();
        let resolved = config.rules.resolve("refs/heads/feature/#1").unwrap();
        let result = Git.placeholders("refs/heads/feature/#1", &config, &resolved.settings);

        pretty_assertions::assert_eq!(result["ref"], "refs.heads.feature._1");
        pretty_assertions::assert_eq!(result["shortref"], "feature._1");
        pretty_assertions::assert_eq!(result["repo"], ".srv.git.project.git");
        pretty_assertions::assert_eq!(result["ref-orig"], "refs/heads/feature/#1");
        pretty_assertions::assert_eq!(result["shortref-orig"], "feature/#1");
        pretty_assertions::assert_eq!(result["repo-orig"], "/srv/git/project.git");
    }

    #[test]
    fn configure_sets_branch_spec_and_local_branch() -> anyhow::Result<()> {
        let mut document = xml::parse(indoc! {r#"
            <project>
              <scm class="hudson.plugins.git.GitSCM">
                <branches>
                  <hudson.plugins.git.BranchSpec><name>master</name></hudson.plugins.git.BranchSpec>
                </branches>
              </scm>
              <disabled>false</disabled>
            </project>
        "#})?;

        Git.configure(&mut document, "refs/heads/feature/one", &config())?;
        pretty_assertions::assert_eq!(
            xml::canonicalize(&document),
            concat!(
                r#"<project><scm class="hudson.plugins.git.GitSCM"><branches>"#,
                "<hudson.plugins.git.BranchSpec><name>feature/one</name></hudson.plugins.git.BranchSpec>",
                "</branches><localBranch>feature/one</localBranch></scm>",
                "<disabled>false</disabled></project>",
            )
        );

        // Reconfiguring reuses the local branch element.
        Git.configure(&mut document, "refs/heads/feature/two", &config())?;
        pretty_assertions::assert_eq!(xml::canonicalize(&document).matches("<localBranch>").count(), 1);

        Ok(())
    }

    #[test]
    fn configure_rejects_foreign_template() -> anyhow::Result<()> {
        let mut document = xml::parse(
            r#"<project><scm class="hudson.scm.SubversionSCM"></scm></project>"#,
        )?;
        let result = Git.configure(&mut document, "refs/heads/main", &config());
        assert!(matches!(result, Err(JobError::TemplateMismatch { .. })));

        let mut document =
            xml::parse(r#"<project><scm class="hudson.plugins.git.GitSCM"></scm></project>"#)?;
        let result = Git.configure(&mut document, "refs/heads/main", &config());
        assert!(matches!(result, Err(JobError::MissingElement { .. })));

        Ok(())
    }
}
