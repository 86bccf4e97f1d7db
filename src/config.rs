// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the YAML document that drives a run, and compile it
//! into a [`Config`] that the rest of the crate consumes. File I/O is left to
//! the caller to figure out.
//!
//! # General Layout
//!
//! The document has three parts. Connection settings say where the
//! repository and Jenkins live. Top-level __defaults__ (`namefmt`,
//! `overwrite`, `enable`, and so on) apply to every job. The `refs` list
//! holds __rule entries__: either a bare pattern that inherits every default,
//! or a single-key map from a pattern to the settings it overrides.
//!
//! ```yaml
//! repo: /srv/git/project.git
//! jenkins: http://jenkins.example.org
//! template: project-template
//! namefmt: "{shortref}"
//! enable: sticky
//! refs:
//!   - "refs/heads/feature/(.*)"
//!   - "refs/heads/release/(.*)":
//!       namefmt: "release-{0}"
//!       tag: releases
//! cleanup: true
//! ```

use crate::{
    cleanup::{CleanupFilters, CleanupFilterError},
    rules::{IgnoreFilter, RuleError, RuleTable},
    scm::ScmKind,
};

use indexmap::IndexMap;
use serde::Deserialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Pattern used when the document lists no rule entries.
pub const DEFAULT_RULE: &str = ".*";

/// Parsed configuration document.
///
/// Treated as immutable once loaded. Command-line overrides are applied to a
/// copy through [`RawConfig::with_options`].
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    /// Repository path or URL to list branches from.
    pub repo: Option<String>,

    /// Base URL of Jenkins server.
    pub jenkins: Option<String>,

    /// Subversion URLs to list branches under, may contain `*` wildcards.
    #[serde(default)]
    pub branches: Vec<String>,

    /// Username for repository access.
    pub scm_username: Option<String>,

    /// Password for repository access.
    pub scm_password: Option<String>,

    /// Settings every rule entry inherits.
    #[serde(flatten)]
    pub defaults: Overrides,

    /// Patterns of branches to exclude outright.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Ordered rule entries, first match wins.
    pub refs: Option<Vec<RuleEntry>>,

    /// Remove managed jobs whose branch disappeared.
    #[serde(default)]
    pub cleanup: CleanupDirective,

    /// Restrict which jobs cleanup looks at.
    #[serde(default)]
    pub cleanup_filters: RawCleanupFilters,

    /// How managed jobs are marked.
    #[serde(default)]
    pub tag_method: TagMethod,
}

impl RawConfig {
    /// Copy configuration with command-line options applied on top.
    pub fn with_options(&self, options: &RunOptions) -> Self {
        let mut config = self.clone();
        if let Some(repo) = &options.repo {
            config.repo = Some(repo.clone());
        }
        if let Some(jenkins) = &options.jenkins {
            config.jenkins = Some(jenkins.clone());
        }
        if let Some(username) = &options.scm_username {
            config.scm_username = Some(username.clone());
        }
        if let Some(password) = &options.scm_password {
            config.scm_password = Some(password.clone());
        }

        config
    }

    /// Compile configuration for a given SCM.
    ///
    /// Resolves inheritance of every rule entry, compiles every pattern, and
    /// fills in built-in defaults.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingKey`] if `repo` or `jenkins` is unset.
    /// - Return [`ConfigError::Rules`] if a rule entry is malformed or lacks
    ///   a template.
    /// - Return [`ConfigError::CleanupFilter`] if a cleanup filter pattern is
    ///   invalid.
    pub fn compile(&self, scm: ScmKind, options: &RunOptions) -> Result<Config> {
        let raw = self.with_options(options);
        let repo = raw.repo.clone().ok_or(ConfigError::MissingKey("repo"))?;
        let jenkins = raw.jenkins.clone().ok_or(ConfigError::MissingKey("jenkins"))?;

        let defaults = Overrides::builtin(scm).merged(&raw.defaults);
        let entries = match &raw.refs {
            Some(entries) => entries.clone(),
            None => vec![RuleEntry::Pattern(DEFAULT_RULE.into())],
        };
        let rules = RuleTable::compile(&entries, &defaults)?;
        let ignore = IgnoreFilter::compile(&raw.ignore)?;
        let cleanup_filters = CleanupFilters::compile(
            &raw.cleanup_filters.views,
            &raw.cleanup_filters.jobs,
        )?;

        // INVARIANT: Subversion lists the conventional branches directory by
        //   default.
        let branches = if raw.branches.is_empty() && scm == ScmKind::Svn {
            vec![format!("{}/branches", repo.trim_end_matches('/'))]
        } else {
            raw.branches.clone()
        };

        Ok(Config {
            repo,
            jenkins,
            branches,
            scm_username: raw.scm_username,
            scm_password: raw.scm_password,
            rules,
            ignore,
            cleanup: raw.cleanup,
            cleanup_filters,
            tag_method: raw.tag_method,
            dry_run: options.dry_run,
            debug: options.debug,
        })
    }
}

impl FromStr for RawConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: RawConfig = serde_yaml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on repository location.
        if let Some(repo) = &config.repo {
            config.repo = Some(
                shellexpand::full(repo)
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        Ok(config)
    }
}

/// Settings a rule entry may override.
///
/// Also used for the top-level defaults. Unset fields inherit from the level
/// above. Merging is shallow: an overridden map replaces the inherited map
/// as a whole.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Overrides {
    /// Replacement for path separators in job names.
    pub namesep: Option<String>,

    /// Job name format.
    pub namefmt: Option<String>,

    /// Update existing jobs whose configuration drifted.
    pub overwrite: Option<bool>,

    /// Enabled state policy.
    pub enable: Option<EnablePolicy>,

    /// Placeholder substitutions applied to every text node.
    pub substitute: Option<IndexMap<String, String>>,

    /// Name of template job to clone.
    pub template: Option<String>,

    /// Sanitize rules for branch derived names.
    pub sanitize: Option<IndexMap<String, String>>,

    /// Label recorded in the managed-job marker.
    pub tag: Option<String>,

    /// Views to add jobs to.
    pub view: Option<Views>,

    /// Trigger a build right after creating a job.
    pub build_on_create: Option<bool>,
}

impl Overrides {
    /// Built-in defaults for every setting except the template.
    pub fn builtin(scm: ScmKind) -> Self {
        Self {
            namesep: Some("-".into()),
            namefmt: Some(scm.default_namefmt().into()),
            overwrite: Some(true),
            enable: Some(EnablePolicy::Sticky),
            substitute: Some(IndexMap::new()),
            template: None,
            sanitize: Some(IndexMap::new()),
            tag: None,
            view: Some(Views::default()),
            build_on_create: Some(false),
        }
    }

    /// Layer `overrides` on top of these settings.
    ///
    /// Every field set in `overrides` wins.
    pub fn merged(&self, overrides: &Overrides) -> Self {
        Self {
            namesep: overrides.namesep.clone().or_else(|| self.namesep.clone()),
            namefmt: overrides.namefmt.clone().or_else(|| self.namefmt.clone()),
            overwrite: overrides.overwrite.or(self.overwrite),
            enable: overrides.enable.or(self.enable),
            substitute: overrides
                .substitute
                .clone()
                .or_else(|| self.substitute.clone()),
            template: overrides.template.clone().or_else(|| self.template.clone()),
            sanitize: overrides.sanitize.clone().or_else(|| self.sanitize.clone()),
            tag: overrides.tag.clone().or_else(|| self.tag.clone()),
            view: overrides.view.clone().or_else(|| self.view.clone()),
            build_on_create: overrides.build_on_create.or(self.build_on_create),
        }
    }
}

/// Rule entry of `refs` list.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    /// Bare pattern inheriting every default.
    Pattern(String),

    /// Single pattern mapped to settings it overrides.
    Override(IndexMap<String, Overrides>),
}

/// One view name or a list of them.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(from = "ViewsRepr")]
pub struct Views(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ViewsRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ViewsRepr> for Views {
    fn from(repr: ViewsRepr) -> Self {
        match repr {
            ViewsRepr::One(view) => Self(vec![view]),
            ViewsRepr::Many(views) => Self(views),
        }
    }
}

/// Enabled state to give reconciled jobs.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(try_from = "EnableRepr")]
pub enum EnablePolicy {
    /// Force job enabled.
    Enabled,

    /// Force job disabled.
    Disabled,

    /// Keep whatever the template says.
    InheritTemplate,

    /// Keep current state of existing jobs, new jobs follow template.
    #[default]
    Sticky,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnableRepr {
    Flag(bool),
    Word(String),
}

impl TryFrom<EnableRepr> for EnablePolicy {
    type Error = String;

    fn try_from(repr: EnableRepr) -> Result<Self, Self::Error> {
        match repr {
            EnableRepr::Flag(true) => Ok(Self::Enabled),
            EnableRepr::Flag(false) => Ok(Self::Disabled),
            EnableRepr::Word(word) => match word.as_str() {
                "true" | "True" => Ok(Self::Enabled),
                "false" | "False" => Ok(Self::Disabled),
                "template" => Ok(Self::InheritTemplate),
                "sticky" => Ok(Self::Sticky),
                _ => Err(format!(
                    "invalid enable policy {word:?}, expected true, false, template, or sticky"
                )),
            },
        }
    }
}

impl Display for EnablePolicy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Enabled => fmt.write_str("true"),
            Self::Disabled => fmt.write_str("false"),
            Self::InheritTemplate => fmt.write_str("template"),
            Self::Sticky => fmt.write_str("sticky"),
        }
    }
}

/// What cleanup removes after reconciliation.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(from = "CleanupRepr")]
pub enum CleanupDirective {
    /// Do not clean up.
    #[default]
    Disabled,

    /// Remove every stale managed job.
    All,

    /// Remove stale managed jobs carrying given tag label.
    Tag(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CleanupRepr {
    Flag(bool),
    Tag(String),
}

impl From<CleanupRepr> for CleanupDirective {
    fn from(repr: CleanupRepr) -> Self {
        match repr {
            CleanupRepr::Flag(true) => Self::All,
            CleanupRepr::Flag(false) => Self::Disabled,
            CleanupRepr::Tag(tag) => Self::Tag(tag),
        }
    }
}

/// Method used to mark jobs as managed.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMethod {
    /// Append marker lines to the job description.
    Description,

    /// Append dedicated marker element to the document.
    #[default]
    Element,
}

/// Uncompiled cleanup filters.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct RawCleanupFilters {
    /// Only consider jobs in these views.
    #[serde(default)]
    pub views: Vec<String>,

    /// Only consider jobs whose name matches one of these patterns.
    #[serde(default)]
    pub jobs: Vec<String>,
}

/// Options given on the command line.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct RunOptions {
    /// Report what would change without changing anything.
    pub dry_run: bool,

    /// Log effective configuration of each branch.
    pub debug: bool,

    /// Repository location override.
    pub repo: Option<String>,

    /// Jenkins URL override.
    pub jenkins: Option<String>,

    /// Repository username override.
    pub scm_username: Option<String>,

    /// Repository password override.
    pub scm_password: Option<String>,
}

/// Compiled configuration of a single run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository path or URL.
    pub repo: String,

    /// Base URL of Jenkins server.
    pub jenkins: String,

    /// Subversion URLs to list.
    pub branches: Vec<String>,

    /// Username for repository access.
    pub scm_username: Option<String>,

    /// Password for repository access.
    pub scm_password: Option<String>,

    /// Ordered pattern table with effective settings.
    pub rules: RuleTable,

    /// Patterns of branches to exclude.
    pub ignore: IgnoreFilter,

    /// Cleanup directive.
    pub cleanup: CleanupDirective,

    /// Cleanup job universe filters.
    pub cleanup_filters: CleanupFilters,

    /// Managed-job marker method.
    pub tag_method: TagMethod,

    /// Report only, never mutate Jenkins.
    pub dry_run: bool,

    /// Log effective configuration of each branch.
    pub debug: bool,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] serde_yaml::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Required key has no value.
    #[error("configuration does not set {0:?}")]
    MissingKey(&'static str),

    /// Rule entries do not compile.
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// Cleanup filter does not compile.
    #[error(transparent)]
    CleanupFilter(#[from] CleanupFilterError),
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
