// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-branch job reconciliation.
//!
//! A [`Job`] starts out as a copy of the template document. The caller walks
//! it through a fixed sequence of edits (SCM section, marker, substitutions,
//! enabled state) and finally calls [`Job::commit`], which compares the
//! canonical form of the result against what Jenkins already has and decides
//! whether to create, update, or leave the job alone.
//!
//! The existing job document is read exactly once, when the job is
//! constructed.

pub mod marker;

use crate::{
    config::{EnablePolicy, TagMethod},
    jenkins::{JenkinsApi, JenkinsError},
    name::{format_name, FormatContext, FormatError},
    rules::is_all_view,
    scm::ScmKind,
    xml::{self, XmlError},
};

use indexmap::IndexMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};
use xmltree::Element;

/// Decision taken for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job did not exist and was created.
    Created,

    /// Job existed with a different configuration and was updated.
    Updated,

    /// Job existed with the same configuration.
    Unchanged,

    /// Job existed but overwriting is disabled.
    OverwriteDisabled,
}

impl Display for JobOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Created => fmt.write_str("job created"),
            Self::Updated => fmt.write_str("job updated"),
            Self::Unchanged => fmt.write_str("job does not need to be reconfigured"),
            Self::OverwriteDisabled => fmt.write_str("overwrite disabled - skipping job"),
        }
    }
}

/// Result of committing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub outcome: JobOutcome,
    pub build_triggered: bool,
}

/// Job managed for one branch.
#[derive(Debug)]
pub struct Job<'a, J: JenkinsApi + ?Sized> {
    name: String,
    branch: String,
    document: Element,
    exists: bool,
    config: Option<String>,
    jenkins: &'a J,
}

impl<'a, J: JenkinsApi + ?Sized> Job<'a, J> {
    /// Construct new job from template, reading the existing job once.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::Jenkins`] if the existing job cannot be read.
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        template: &Element,
        jenkins: &'a J,
    ) -> Result<Self> {
        let name = name.into();
        let exists = jenkins.job_exists(&name)?;
        let config = if exists { jenkins.job_config(&name)? } else { None };

        Ok(Self {
            name,
            branch: branch.into(),
            document: template.clone(),
            exists,
            config,
            jenkins,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn document(&self) -> &Element {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Element {
        &mut self.document
    }

    /// Apply enabled state policy.
    ///
    /// Sticky keeps the state of an existing job by looking at its raw
    /// document, new jobs keep the template state.
    pub fn set_state(&mut self, policy: EnablePolicy) {
        let disabled = match policy {
            EnablePolicy::Enabled => Some(false),
            EnablePolicy::Disabled => Some(true),
            EnablePolicy::InheritTemplate => None,
            EnablePolicy::Sticky => self.config.as_deref().and_then(|config| {
                if config.contains("<disabled>true</disabled>") {
                    Some(true)
                } else if config.contains("<disabled>false</disabled>") {
                    Some(false)
                } else {
                    None
                }
            }),
        };

        if let Some(disabled) = disabled {
            xml::set_text(
                xml::child_or_insert(&mut self.document, "disabled"),
                disabled.to_string(),
            );
        }
    }

    /// Mark job as managed.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::NoDescriptionTarget`] if the description method
    ///   finds nowhere to write.
    pub fn mark(&mut self, method: TagMethod, tag: Option<&str>) -> Result<()> {
        marker::mark(&mut self.document, method, &self.branch, tag)
    }

    /// Replace placeholders inside every text node of the document.
    ///
    /// Each replacement is a name format rendered against `context`, and is
    /// only rendered for text that contains its placeholder.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::Format`] if a replacement refers to an undefined
    ///   placeholder.
    pub fn substitute(
        &mut self,
        rules: &IndexMap<String, String>,
        context: &FormatContext,
    ) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }

        xml::try_for_each_text_mut(&mut self.document, &mut |text: &mut String| {
            for (placeholder, replacement) in rules {
                if text.contains(placeholder.as_str()) {
                    let value = format_name(replacement, context)?;
                    *text = text.replace(placeholder.as_str(), &value);
                }
            }
            Ok::<(), FormatError>(())
        })?;

        Ok(())
    }

    /// Canonical form of the document as it would be uploaded.
    pub fn canonical(&self) -> String {
        xml::canonicalize(&self.document)
    }

    /// Create, update, or skip job.
    ///
    /// Dry runs decide the same way but never write to Jenkins.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::Xml`] if the existing document is not well-formed.
    /// - Return [`JobError::Jenkins`] if Jenkins rejects a write.
    #[instrument(skip(self), fields(job = %self.name), level = "debug")]
    pub fn commit(&self, overwrite: bool, build_on_create: bool, dry_run: bool) -> Result<Commit> {
        let desired = self.canonical();
        let mut build_triggered = false;

        let outcome = match (self.exists, overwrite) {
            (true, true) => {
                let existing = self.config.as_deref().unwrap_or_default();
                let existing = xml::canonicalize(&xml::parse(existing)?);
                if existing == desired {
                    JobOutcome::Unchanged
                } else {
                    if !dry_run {
                        self.jenkins.update_job(&self.name, &desired)?;
                    }
                    JobOutcome::Updated
                }
            }
            (true, false) => JobOutcome::OverwriteDisabled,
            (false, _) => {
                if !dry_run {
                    self.jenkins.create_job(&self.name, &desired)?;
                }
                info!("{}", JobOutcome::Created);

                if build_on_create {
                    if !dry_run {
                        self.jenkins.build_job(&self.name)?;
                    }
                    build_triggered = true;
                    info!("build triggered");
                }

                return Ok(Commit {
                    outcome: JobOutcome::Created,
                    build_triggered,
                });
            }
        };
        info!("{outcome}");

        Ok(Commit {
            outcome,
            build_triggered,
        })
    }

    /// Add job to every view it is not a member of yet.
    ///
    /// Returns the views the job was added to.
    ///
    /// # Errors
    ///
    /// - Return [`JobError::Jenkins`] if view membership cannot be read or
    ///   changed.
    pub fn attach_views(&self, views: &[String], dry_run: bool) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for view in views.iter().filter(|view| !is_all_view(view)) {
            if self.jenkins.view_jobs(view)?.contains(&self.name) {
                continue;
            }

            if !dry_run {
                self.jenkins.add_job_to_view(view, &self.name)?;
            }
            info!("job added to view: {view}");
            added.push(view.clone());
        }

        Ok(added)
    }
}

/// Job reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Template does not use the SCM being run.
    #[error("template job is not configured to use {scm} as an SCM")]
    TemplateMismatch { scm: ScmKind },

    /// Template lacks an element that must be set.
    #[error("template job has no {element:?} element")]
    MissingElement { element: String },

    /// Nowhere to record the description marker.
    #[error("cannot find a description element in {root:?} document")]
    NoDescriptionTarget { root: String },

    /// Name format rendering failed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Document is not well-formed.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Jenkins request failed.
    #[error(transparent)]
    Jenkins(#[from] JenkinsError),
}

/// Friendly result alias :3
pub type Result<T, E = JobError> = std::result::Result<T, E>;
