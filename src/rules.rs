// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule compilation and branch resolution.
//!
//! Rule entries from the configuration document are compiled once into a
//! [`RuleTable`]: an ordered list of patterns, each paired with fully merged
//! [`Settings`]. Think of it like Maven's effective POM. Every entry already
//! has inheritance folded in, so no lookups happen later on.
//!
//! # Matching
//!
//! Patterns are anchored at the start of the branch name but not at its end,
//! so `refs/heads/feature/(.*)` matches `refs/heads/feature/one` while
//! `feature/(.*)` does not. Declaration order is priority order: the first
//! pattern that matches a branch decides its settings. A branch that matches
//! nothing is simply not managed.

use crate::{
    config::{EnablePolicy, Overrides, RuleEntry},
    name::{FormatContext, SanitizeError, SanitizeRules},
};

use indexmap::IndexMap;
use regex::Regex;

/// Name of the view every job implicitly belongs to.
pub const ALL_VIEW: &str = "All";

/// Effective settings of a rule entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub namesep: String,
    pub namefmt: String,
    pub overwrite: bool,
    pub enable: EnablePolicy,
    pub substitute: IndexMap<String, String>,
    pub template: String,
    pub sanitize: SanitizeRules,
    pub tag: Option<String>,
    pub view: Vec<String>,
    pub build_on_create: bool,
}

impl Settings {
    /// Turn fully merged overrides into effective settings.
    ///
    /// The implicit all-jobs view is dropped from the view list, Jenkins
    /// offers no way to query or change its membership.
    ///
    /// # Errors
    ///
    /// - Return [`RuleError::MissingTemplate`] if no template is set.
    /// - Return [`RuleError::Sanitize`] if sanitize rules do not compile.
    pub fn from_overrides(pattern: &str, merged: &Overrides) -> Result<Self> {
        let template = merged
            .template
            .clone()
            .ok_or_else(|| RuleError::MissingTemplate {
                pattern: pattern.into(),
            })?;
        let sanitize = SanitizeRules::compile(&merged.sanitize.clone().unwrap_or_default())?;
        let view = merged
            .view
            .clone()
            .map(|views| views.0)
            .unwrap_or_default()
            .into_iter()
            .filter(|view| !is_all_view(view))
            .collect();

        Ok(Self {
            namesep: merged.namesep.clone().unwrap_or_else(|| "-".into()),
            namefmt: merged.namefmt.clone().unwrap_or_else(|| "{shortref}".into()),
            overwrite: merged.overwrite.unwrap_or(true),
            enable: merged.enable.unwrap_or_default(),
            substitute: merged.substitute.clone().unwrap_or_default(),
            template,
            sanitize,
            tag: merged.tag.clone(),
            view,
            build_on_create: merged.build_on_create.unwrap_or(false),
        })
    }

    /// Key/value listing for debug output.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let sanitize = self
            .sanitize
            .iter()
            .map(|(key, value)| format!("{key:?}: {value:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        let substitute = self
            .substitute
            .iter()
            .map(|(key, value)| format!("{key:?}: {value:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        vec![
            ("template", self.template.clone()),
            ("namesep", self.namesep.clone()),
            ("namefmt", self.namefmt.clone()),
            ("overwrite", self.overwrite.to_string()),
            ("enable", self.enable.to_string()),
            ("sanitize", format!("{{{sanitize}}}")),
            ("substitute", format!("{{{substitute}}}")),
            ("tag", self.tag.clone().unwrap_or_default()),
            ("view", self.view.join(", ")),
            ("build-on-create", self.build_on_create.to_string()),
        ]
    }
}

/// Check if view name refers to the implicit all-jobs view.
pub fn is_all_view(view: &str) -> bool {
    view.eq_ignore_ascii_case(ALL_VIEW)
}

/// Compiled rule entry.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    regex: Regex,
    settings: Settings,
}

impl Rule {
    /// Pattern as written in the configuration.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Effective settings of rule.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Ordered table of compiled rule entries.
///
/// # Invariant
///
/// - Table order is declaration order.
/// - Every entry carries complete settings.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Compile rule entries against a set of defaults.
    ///
    /// Bare patterns take the defaults verbatim. Override entries take the
    /// defaults with each overridden field replaced.
    ///
    /// # Errors
    ///
    /// - Return [`RuleError::MalformedEntry`] if an override entry does not
    ///   hold exactly one pattern.
    /// - Return [`RuleError::Pattern`] if a pattern does not compile.
    /// - Return [`RuleError::MissingTemplate`] if an entry ends up without a
    ///   template.
    pub fn compile(entries: &[RuleEntry], defaults: &Overrides) -> Result<Self> {
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            let (pattern, merged) = match entry {
                RuleEntry::Pattern(pattern) => (pattern.clone(), defaults.clone()),
                RuleEntry::Override(map) => {
                    let mut iter = map.iter();
                    match (iter.next(), iter.next()) {
                        (Some((pattern, overrides)), None) => {
                            (pattern.clone(), defaults.merged(overrides))
                        }
                        _ => {
                            return Err(RuleError::MalformedEntry {
                                patterns: map.keys().cloned().collect(),
                            })
                        }
                    }
                }
            };

            let regex = anchored(&pattern)?;
            let settings = Settings::from_overrides(&pattern, &merged)?;
            rules.push(Rule {
                pattern,
                regex,
                settings,
            });
        }

        Ok(Self { rules })
    }

    /// Resolve branch to settings of first matching rule.
    ///
    /// Returns a fresh copy of the settings along with the capture groups of
    /// the match, or `None` if no rule matches.
    pub fn resolve(&self, branch: &str) -> Option<ResolvedBranch> {
        self.rules.iter().find_map(|rule| {
            let captures = rule.regex.captures(branch)?;
            let groups = captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            let named = rule
                .regex
                .capture_names()
                .flatten()
                .map(|name| {
                    let value = captures
                        .name(name)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default();
                    (name.to_string(), value)
                })
                .collect();

            Some(ResolvedBranch {
                branch: branch.to_string(),
                pattern: rule.pattern.clone(),
                settings: rule.settings.clone(),
                groups,
                named,
            })
        })
    }

    /// Iterate over rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Names of every template referenced by the table, without duplicates.
    pub fn templates(&self) -> Vec<String> {
        let mut templates = Vec::new();
        for rule in &self.rules {
            if !templates.contains(&rule.settings.template) {
                templates.push(rule.settings.template.clone());
            }
        }

        templates
    }

    /// Names of every view referenced by the table, without duplicates.
    pub fn views(&self) -> Vec<String> {
        let mut views = Vec::new();
        for view in self.rules.iter().flat_map(|rule| &rule.settings.view) {
            if !views.contains(view) {
                views.push(view.clone());
            }
        }

        views
    }
}

/// Branch resolved to its effective settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBranch {
    /// Branch name as listed.
    pub branch: String,

    /// Pattern of matching rule.
    pub pattern: String,

    /// Private copy of effective settings.
    pub settings: Settings,

    /// Positional capture groups, unmatched groups are empty.
    pub groups: Vec<String>,

    /// Named capture groups, unmatched groups are empty.
    pub named: IndexMap<String, String>,
}

impl ResolvedBranch {
    /// Format context holding capture groups plus extra semantic fields.
    ///
    /// Fields win over named groups of the same name.
    pub fn format_context(&self, fields: &IndexMap<String, String>) -> FormatContext {
        let mut context = FormatContext::new(self.groups.clone(), self.named.clone());
        context.extend(fields.iter().map(|(key, value)| (key.clone(), value.clone())));
        context
    }
}

/// Branch exclusion patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Regex>,
}

impl IgnoreFilter {
    /// Compile exclusion patterns.
    ///
    /// # Errors
    ///
    /// - Return [`RuleError::Pattern`] if a pattern does not compile.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| anchored(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Check if any exclusion pattern matches branch.
    pub fn is_ignored(&self, branch: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(branch))
    }

    /// Split branches into ignored and candidate branches, keeping order.
    pub fn partition(
        &self,
        branches: impl IntoIterator<Item = String>,
    ) -> (Vec<String>, Vec<String>) {
        branches
            .into_iter()
            .partition(|branch| self.is_ignored(branch))
    }
}

/// Compile pattern with match-at-start semantics.
pub(crate) fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| RuleError::Pattern {
        pattern: pattern.into(),
        source,
    })
}

/// Rule compilation error types.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Override entry does not map exactly one pattern.
    #[error("rule entry must map exactly one pattern, found {patterns:?}")]
    MalformedEntry { patterns: Vec<String> },

    /// Pattern fails to compile.
    #[error("invalid pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Entry has no template job to clone.
    #[error("no template configured for pattern {pattern:?}")]
    MissingTemplate { pattern: String },

    /// Sanitize rules fail to compile.
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
}

/// Friendly result alias :3
pub type Result<T, E = RuleError> = std::result::Result<T, E>;
