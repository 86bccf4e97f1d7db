// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source control adapters.
//!
//! Every supported SCM does three things for a run: list the branches of a
//! repository, derive the semantic placeholder fields of a branch (`shortref`,
//! `path`, and so on), and point the SCM section of a cloned template at a
//! branch. The [`Scm`] trait captures those three, with one implementation per
//! system in [`git`], [`hg`], and [`svn`].

pub mod git;
pub mod hg;
pub mod svn;

use crate::{config::Config, job::JobError, rules::Settings};

use indexmap::IndexMap;
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    process::Command,
};
use tracing::debug;
use xmltree::Element;

/// Supported source control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScmKind {
    Git,
    Hg,
    Svn,
}

impl ScmKind {
    /// Name format used when configuration does not set one.
    pub fn default_namefmt(&self) -> &'static str {
        match self {
            Self::Git => "{shortref}",
            Self::Hg => "{branch}",
            Self::Svn => "{path}",
        }
    }

    /// Class attribute of the template `scm` element this system expects.
    pub fn scm_class(&self) -> &'static str {
        match self {
            Self::Git => "hudson.plugins.git.GitSCM",
            Self::Hg => "hudson.plugins.mercurial.MercurialSCM",
            Self::Svn => "hudson.scm.SubversionSCM",
        }
    }
}

impl Display for ScmKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Git => fmt.write_str("git"),
            Self::Hg => fmt.write_str("hg"),
            Self::Svn => fmt.write_str("svn"),
        }
    }
}

/// Source control adapter.
pub trait Scm {
    /// Which system this adapter drives.
    fn kind(&self) -> ScmKind;

    /// List branch identifiers of configured repository.
    ///
    /// # Errors
    ///
    /// - Return [`ScmError`] if the repository cannot be read.
    fn list_branches(&self, config: &Config) -> Result<Vec<String>>;

    /// Semantic placeholder fields of branch.
    ///
    /// Fields without an `-orig` suffix are sanitized with the settings'
    /// sanitize rules and have every `/` replaced by the name separator.
    fn placeholders(&self, branch: &str, config: &Config, settings: &Settings)
        -> IndexMap<String, String>;

    /// Point SCM section of a cloned template at branch.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::TemplateMismatch`] if the template does not use
    ///   this SCM.
    /// - Return [`JobError::MissingElement`] if the SCM section lacks an
    ///   element this adapter must set.
    fn configure(
        &self,
        document: &mut Element,
        branch: &str,
        config: &Config,
    ) -> Result<(), JobError>;
}

/// Make a placeholder value safe for use inside a job name.
pub(crate) fn name_safe(value: &str, settings: &Settings) -> String {
    settings.sanitize.apply(value).replace('/', &settings.namesep)
}

/// Locate the `scm` element of a template that uses a given SCM.
///
/// # Errors
///
/// - Return [`JobError::TemplateMismatch`] if no top-level `scm` element
///   carries the class of `kind`.
pub(crate) fn scm_section(document: &mut Element, kind: ScmKind) -> Result<&mut Element, JobError> {
    document
        .children
        .iter_mut()
        .filter_map(|child| child.as_mut_element())
        .find(|child| {
            child.name == "scm"
                && child.attributes.get("class").map(String::as_str) == Some(kind.scm_class())
        })
        .ok_or(JobError::TemplateMismatch { scm: kind })
}

/// Run command to completion without user interaction.
///
/// Returns standard output with trailing newlines chomped.
///
/// # Errors
///
/// - Return [`ScmError::Io`] if the command cannot be spawned.
/// - Return [`ScmError::CommandFailed`] if the command exits unsuccessfully.
pub(crate) fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let mut command = Command::new(cmd.as_ref());
    command.args(args);
    let rendered = format!("{command:?}");
    debug!("run {rendered}");

    let output = command.output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        // INVARIANT: Chomp trailing newlines.
        let message = stderr.trim_end_matches(['\r', '\n']).to_string();
        return Err(ScmError::CommandFailed {
            command: rendered,
            message,
        });
    }

    Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
}

/// Source control error types.
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    /// External command exited unsuccessfully.
    #[error("command {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Failed to read repository through libgit2.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Failed to spawn command or create scratch space.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ScmError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;
    use pretty_assertions::assert_eq;

    #[test]
    fn scm_section_requires_matching_class() -> anyhow::Result<()> {
        let mut document =
            xml::parse(r#"<project><scm class="hudson.plugins.git.GitSCM"></scm></project>"#)?;
        assert!(scm_section(&mut document, ScmKind::Git).is_ok());
        assert!(matches!(
            scm_section(&mut document, ScmKind::Svn),
            Err(JobError::TemplateMismatch { scm: ScmKind::Svn })
        ));

        Ok(())
    }

    #[test]
    fn syscall_reports_failing_command() {
        let result = syscall_non_interactive("sh", ["-c", "echo oops >&2; exit 3"]);
        match result {
            Err(ScmError::CommandFailed { command, message }) => {
                assert!(command.contains("sh"));
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn syscall_chomps_output() {
        let result = syscall_non_interactive("sh", ["-c", "printf 'a\\nb\\n\\n'"]).unwrap();
        assert_eq!(result, "a\nb");
    }
}
