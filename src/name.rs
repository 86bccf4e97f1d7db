// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Job name sanitizing and formatting.
//!
//! Branch names routinely carry characters that Jenkins either rejects or
//! mangles in URLs. Before a branch name becomes part of a job name it passes
//! through a set of __sanitize rules__, and the result is rendered into a
//! __name format__ such as `"ci-{shortref}"`.
//!
//! # Sanitize Rules
//!
//! A sanitize rule maps a key to a replacement string. Keys prefixed with
//! `re:` are regular expressions, so the replacement may refer to capture
//! groups through `$1` or `${name}`. Any other key is read as a set of
//! literal characters, each of which is replaced by the replacement verbatim.
//! Rules are applied one after another in declaration order.
//!
//! # Name Formats
//!
//! Name formats follow the placeholder syntax of Python's `str.format`:
//! `{0}`, `{1}`, and `{}` refer to positional regex groups, `{name}` refers to
//! named regex groups and to the semantic fields supplied by the SCM adapter.
//! Literal braces are written as `{{` and `}}`.

use indexmap::IndexMap;
use regex::{NoExpand, Regex};

/// Prefix marking a sanitize key as a regular expression.
pub const REGEX_PREFIX: &str = "re:";

/// Ordered set of compiled sanitize rules.
#[derive(Debug, Clone, Default)]
pub struct SanitizeRules {
    rules: Vec<SanitizeRule>,
}

#[derive(Debug, Clone)]
struct SanitizeRule {
    key: String,
    pattern: Regex,
    replacement: String,
    expand: bool,
}

impl SanitizeRules {
    /// Compile sanitize rules from their declared key/replacement mapping.
    ///
    /// # Errors
    ///
    /// - Return [`SanitizeError::EmptyKey`] if a rule has no characters to
    ///   match.
    /// - Return [`SanitizeError::Pattern`] if a `re:` key is not a valid
    ///   regular expression.
    pub fn compile(rules: &IndexMap<String, String>) -> Result<Self, SanitizeError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (key, replacement) in rules {
            let (source, expand) = match key.strip_prefix(REGEX_PREFIX) {
                Some(pattern) => (pattern.to_string(), true),
                None => {
                    let alternatives = key
                        .chars()
                        .map(|ch| regex::escape(ch.encode_utf8(&mut [0; 4])))
                        .collect::<Vec<_>>();
                    (alternatives.join("|"), false)
                }
            };

            // INVARIANT: An empty pattern matches between every character.
            if source.is_empty() {
                return Err(SanitizeError::EmptyKey);
            }

            let pattern = Regex::new(&source).map_err(|source| SanitizeError::Pattern {
                key: key.clone(),
                source,
            })?;

            compiled.push(SanitizeRule {
                key: key.clone(),
                pattern,
                replacement: replacement.clone(),
                expand,
            });
        }

        Ok(Self { rules: compiled })
    }

    /// Apply every rule to `name` in declaration order.
    pub fn apply(&self, name: &str) -> String {
        let mut result = name.to_string();
        for rule in &self.rules {
            result = if rule.expand {
                rule.pattern
                    .replace_all(&result, rule.replacement.as_str())
                    .into_owned()
            } else {
                rule.pattern
                    .replace_all(&result, NoExpand(&rule.replacement))
                    .into_owned()
            };
        }

        result
    }

    /// Check if there are no rules to apply.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the declared key/replacement pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules
            .iter()
            .map(|rule| (rule.key.as_str(), rule.replacement.as_str()))
    }
}

impl PartialEq for SanitizeRules {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for SanitizeRules {}

/// Sanitize `name` with a declared rule mapping.
///
/// Convenience wrapper over [`SanitizeRules::compile`] and
/// [`SanitizeRules::apply`].
///
/// # Errors
///
/// - Return [`SanitizeError`] if the rules do not compile.
pub fn sanitize(name: &str, rules: &IndexMap<String, String>) -> Result<String, SanitizeError> {
    Ok(SanitizeRules::compile(rules)?.apply(name))
}

/// Values that placeholders in a name format can refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatContext {
    positional: Vec<String>,
    named: IndexMap<String, String>,
}

impl FormatContext {
    /// Construct new format context from positional and named values.
    pub fn new(positional: Vec<String>, named: IndexMap<String, String>) -> Self {
        Self { positional, named }
    }

    /// Insert or replace a named value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.named.insert(key.into(), value.into());
    }

    /// Insert or replace every named value in `fields`.
    pub fn extend<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in fields {
            self.insert(key, value);
        }
    }

    /// Lookup named value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    /// Lookup positional value.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }
}

/// Render a name format against a format context.
///
/// # Errors
///
/// - Return [`FormatError::Undefined`] if the format refers to a placeholder
///   the context does not define.
/// - Return [`FormatError::Unsupported`] if a placeholder carries a
///   conversion (`{0!r}`) or format spec (`{0:>5}`).
/// - Return [`FormatError::Unbalanced`] if a brace is left unclosed or a lone
///   `}` appears.
pub fn format_name(template: &str, context: &FormatContext) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(FormatError::Unbalanced {
                                template: template.into(),
                            })
                        }
                        Some(ch) => field.push(ch),
                    }
                }

                // INVARIANT: Placeholders carry no conversion or format spec.
                if field.contains([':', '!']) {
                    return Err(FormatError::Unsupported {
                        placeholder: field,
                        template: template.into(),
                    });
                }

                let value = if field.is_empty() {
                    let value = context.positional(auto_index);
                    auto_index += 1;
                    value
                } else if let Ok(index) = field.parse::<usize>() {
                    context.positional(index)
                } else {
                    context.get(&field)
                };

                match value {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(FormatError::Undefined {
                            placeholder: field,
                            template: template.into(),
                        })
                    }
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(FormatError::Unbalanced {
                    template: template.into(),
                })
            }
            ch => out.push(ch),
        }
    }

    Ok(out)
}

/// Sanitize rule compilation error types.
#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    /// Rule key contains nothing to match.
    #[error("sanitize rule with empty key")]
    EmptyKey,

    /// Regular expression rule fails to compile.
    #[error("invalid sanitize pattern {key:?}")]
    Pattern {
        key: String,
        #[source]
        source: regex::Error,
    },
}

/// Name format rendering error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Placeholder has no value.
    #[error("undefined placeholder {{{placeholder}}} in name format {template:?}")]
    Undefined {
        placeholder: String,
        template: String,
    },

    /// Placeholder uses a conversion or format spec.
    #[error("conversions and format specs are not supported: {{{placeholder}}} in name format {template:?}")]
    Unsupported {
        placeholder: String,
        template: String,
    },

    /// Braces do not pair up.
    #[error("unbalanced braces in name format {template:?}")]
    Unbalanced { template: String },
}
