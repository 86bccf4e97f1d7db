// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Single reconciliation pass.
//!
//! [`Synchronizer::run`] drives a whole invocation: check that every template
//! and view the configuration refers to exists, list branches, drop ignored
//! and unmatched ones, reconcile a job per remaining branch, and finally hand
//! the names of every reconciled job to the cleanup engine.
//!
//! Branches are processed one at a time in listing order. The first fatal
//! error stops the pass. Jobs written before it stay written, and the next
//! run picks up from whatever state Jenkins is in.

use crate::{
    cleanup::{Cleanup, CleanupError, CleanupReport},
    config::{CleanupDirective, Config},
    jenkins::{JenkinsApi, JenkinsError},
    job::{Job, JobError, JobOutcome},
    name::format_name,
    rules::ResolvedBranch,
    scm::{Scm, ScmError},
    xml::{self, XmlError},
};

use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use xmltree::Element;

/// What happened to one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub branch: String,
    pub name: String,
    pub existed: bool,
    pub outcome: JobOutcome,
    pub build_triggered: bool,
    pub views_added: Vec<String>,
}

/// What happened during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Branches dropped by ignore patterns.
    pub ignored: Vec<String>,

    /// Branches no rule matched.
    pub unmatched: Vec<String>,

    /// Reconciled jobs in processing order.
    pub jobs: Vec<JobReport>,

    /// Cleanup outcome, `None` if cleanup is disabled.
    pub cleanup: Option<CleanupReport>,
}

impl SyncReport {
    /// Report of job reconciled for branch.
    pub fn job(&self, branch: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.branch == branch)
    }

    /// Count jobs with a given outcome.
    pub fn count(&self, outcome: JobOutcome) -> usize {
        self.jobs.iter().filter(|job| job.outcome == outcome).count()
    }
}

/// Reconciliation driver.
#[derive(Debug)]
pub struct Synchronizer<'a, J, S>
where
    J: JenkinsApi + ?Sized,
    S: Scm + ?Sized,
{
    jenkins: &'a J,
    scm: &'a S,
    config: &'a Config,
}

impl<'a, J, S> Synchronizer<'a, J, S>
where
    J: JenkinsApi + ?Sized,
    S: Scm + ?Sized,
{
    /// Construct new synchronizer.
    pub fn new(jenkins: &'a J, scm: &'a S, config: &'a Config) -> Self {
        Self {
            jenkins,
            scm,
            config,
        }
    }

    /// Run a full reconciliation pass.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::MissingTemplate`] or [`SyncError::MissingView`]
    ///   before any branch is processed if the configuration refers to
    ///   something Jenkins does not have.
    /// - Return [`SyncError::Scm`] if branches cannot be listed.
    /// - Return [`SyncError::Branch`] if a branch fails to reconcile.
    /// - Return [`SyncError::Cleanup`] if cleanup fails.
    #[instrument(skip(self), fields(scm = %self.scm.kind(), repo = %self.config.repo), level = "debug")]
    pub fn run(&self) -> Result<SyncReport> {
        let templates = self.load_templates()?;
        self.check_views()?;

        let branches = self.scm.list_branches(self.config)?;
        let (ignored, candidates) = self.config.ignore.partition(branches);
        for branch in &ignored {
            warn!("ignoring branch: {branch}");
        }

        let mut report = SyncReport {
            ignored,
            ..Default::default()
        };
        let mut touched = HashSet::new();
        for branch in candidates {
            let Some(resolved) = self.config.rules.resolve(&branch) else {
                debug!("no rule matches branch: {branch}");
                report.unmatched.push(branch);
                continue;
            };

            let template = templates.get(&resolved.settings.template).ok_or_else(|| {
                SyncError::MissingTemplate {
                    name: resolved.settings.template.clone(),
                }
            })?;
            let job = self
                .reconcile(&resolved, template)
                .map_err(|source| SyncError::Branch {
                    branch: branch.clone(),
                    source,
                })?;
            touched.insert(job.name.clone());
            report.jobs.push(job);
        }

        if self.config.cleanup != CleanupDirective::Disabled {
            info!("cleaning up stale jobs");
            report.cleanup = Some(Cleanup::new(self.jenkins, self.config).run(&touched)?);
        }

        Ok(report)
    }

    /// Fetch and parse every template the rules refer to.
    fn load_templates(&self) -> Result<IndexMap<String, Element>> {
        let mut templates = IndexMap::new();
        for name in self.config.rules.templates() {
            let config = self
                .jenkins
                .job_config(&name)?
                .ok_or_else(|| SyncError::MissingTemplate { name: name.clone() })?;
            templates.insert(name, xml::parse(&config)?);
        }

        Ok(templates)
    }

    fn check_views(&self) -> Result<()> {
        let rule_views = self.config.rules.views();
        let filter_views = self.config.cleanup_filters.views();
        for view in rule_views.iter().chain(filter_views) {
            if !self.jenkins.view_exists(view)? {
                return Err(SyncError::MissingView { name: view.clone() });
            }
        }

        Ok(())
    }

    fn reconcile(
        &self,
        resolved: &ResolvedBranch,
        template: &Element,
    ) -> Result<JobReport, JobError> {
        let branch = resolved.branch.as_str();
        let settings = &resolved.settings;
        info!("processing ref: {branch}");

        let fields = self.scm.placeholders(branch, self.config, settings);
        let mut context = resolved.format_context(&fields);
        let name = format_name(&settings.namefmt, &context)?.replace('/', &settings.namesep);
        context.insert("job_name", name.as_str());

        let mut job = Job::new(name.as_str(), branch, template, self.jenkins)?;
        info!("job name: {}", job.name());
        info!("job exists: {}", job.exists());

        self.scm.configure(job.document_mut(), branch, self.config)?;
        job.mark(self.config.tag_method, settings.tag.as_deref())?;
        job.substitute(&settings.substitute, &context)?;
        job.set_state(settings.enable);

        let commit = job.commit(settings.overwrite, settings.build_on_create, self.config.dry_run)?;
        let views_added = job.attach_views(&settings.view, self.config.dry_run)?;

        if self.config.debug {
            debug!("config for {branch} (matched {:?}):", resolved.pattern);
            for (key, value) in settings.describe() {
                debug!("  {key}: {value}");
            }
        }

        Ok(JobReport {
            branch: branch.to_string(),
            name,
            existed: job.exists(),
            outcome: commit.outcome,
            build_triggered: commit.build_triggered,
            views_added,
        })
    }
}

/// Reconciliation pass error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Template job does not exist.
    #[error("template job {name:?} does not exist")]
    MissingTemplate { name: String },

    /// View does not exist.
    #[error("view {name:?} does not exist")]
    MissingView { name: String },

    /// Template document is not well-formed.
    #[error(transparent)]
    Template(#[from] XmlError),

    /// Branches cannot be listed.
    #[error(transparent)]
    Scm(#[from] ScmError),

    /// Jenkins request failed.
    #[error(transparent)]
    Jenkins(#[from] JenkinsError),

    /// Branch failed to reconcile.
    #[error("failed to process branch {branch:?}")]
    Branch {
        branch: String,
        #[source]
        source: JobError,
    },

    /// Cleanup failed.
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
