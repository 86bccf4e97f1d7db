// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Removal of stale managed jobs.
//!
//! Once every branch has been reconciled, jobs that carry the managed-job
//! marker but were not touched by this run belong to branches that no longer
//! exist. Cleanup removes them, optionally limited to one tag label so that
//! several configurations can share a Jenkins server without deleting each
//! other's jobs.
//!
//! Permission problems are tolerated. A job whose document cannot be read is
//! left alone, and a job that cannot be deleted is reported. Every other
//! failure aborts the run.

use crate::{
    config::{CleanupDirective, Config, TagMethod},
    jenkins::{JenkinsApi, JenkinsError},
    job::{marker::managed_tags, JobError},
};

use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Compiled cleanup filters.
#[derive(Debug, Clone, Default)]
pub struct CleanupFilters {
    views: Vec<String>,
    jobs: Vec<Regex>,
}

impl CleanupFilters {
    /// Compile view and job name filters.
    ///
    /// # Errors
    ///
    /// - Return [`CleanupFilterError::Pattern`] if a job name pattern does
    ///   not compile.
    pub fn compile(views: &[String], jobs: &[String]) -> Result<Self, CleanupFilterError> {
        let jobs = jobs
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
                    CleanupFilterError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            views: views.to_vec(),
            jobs,
        })
    }

    /// Check if no filter is configured.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.jobs.is_empty()
    }

    /// Views whose jobs are considered.
    pub fn views(&self) -> &[String] {
        &self.views
    }

    /// Check if any job name pattern matches name.
    pub fn matches_job(&self, name: &str) -> bool {
        self.jobs.iter().any(|pattern| pattern.is_match(name))
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Jobs deleted, or that would be deleted in a dry run.
    pub deleted: Vec<String>,

    /// Jobs left alone because their document could not be read.
    pub forbidden_read: Vec<String>,

    /// Jobs that could not be deleted.
    pub forbidden_delete: Vec<String>,
}

/// Cleanup engine.
#[derive(Debug)]
pub struct Cleanup<'a, J: JenkinsApi + ?Sized> {
    jenkins: &'a J,
    config: &'a Config,
}

impl<'a, J: JenkinsApi + ?Sized> Cleanup<'a, J> {
    /// Construct new cleanup engine.
    pub fn new(jenkins: &'a J, config: &'a Config) -> Self {
        Self { jenkins, config }
    }

    /// Delete stale managed jobs.
    ///
    /// Jobs named in `touched` are never deleted.
    ///
    /// # Errors
    ///
    /// - Return [`CleanupError::Jenkins`] if Jenkins fails with anything but a
    ///   permission denial.
    /// - Return [`CleanupError::Marker`] if a job document is not well-formed.
    #[instrument(skip(self, touched), level = "debug")]
    pub fn run(&self, touched: &HashSet<String>) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        if self.config.cleanup == CleanupDirective::Disabled {
            return Ok(report);
        }

        for name in self.universe()? {
            if touched.contains(&name) {
                debug!("skip {name}: reconciled this run");
                continue;
            }

            let config = match self.jenkins.job_config(&name) {
                Ok(Some(config)) => config,
                Ok(None) => continue,
                Err(error) if error.is_forbidden() => {
                    warn!("cannot read config of {name}: {error}");
                    report.forbidden_read.push(name);
                    continue;
                }
                Err(error) => return Err(error.into()),
            };

            if !self.is_candidate(&name, &config, self.config.tag_method)? {
                continue;
            }

            if !self.config.dry_run {
                match self.jenkins.delete_job(&name) {
                    Ok(()) => {}
                    Err(error) if error.is_forbidden() => {
                        warn!("cannot delete {name}: {error}");
                        report.forbidden_delete.push(name);
                        continue;
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            info!("removing job: {name}");
            report.deleted.push(name);
        }

        Ok(report)
    }

    /// Names of jobs to look at, without duplicates.
    fn universe(&self) -> Result<Vec<String>> {
        let filters = &self.config.cleanup_filters;
        if filters.is_empty() {
            return Ok(self.jenkins.list_jobs()?);
        }

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for view in filters.views() {
            for name in self.jenkins.view_jobs(view)? {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }

        if !filters.jobs.is_empty() {
            for name in self.jenkins.list_jobs()? {
                if filters.matches_job(&name) && seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }

        Ok(names)
    }

    fn is_candidate(&self, name: &str, config: &str, method: TagMethod) -> Result<bool> {
        let Some(tags) = managed_tags(config, method)? else {
            debug!("skip {name}: not managed");
            return Ok(false);
        };

        if let CleanupDirective::Tag(label) = &self.config.cleanup {
            if !tags.contains(label) {
                debug!("skip {name}: not tagged {label}");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Cleanup filter compilation error types.
#[derive(Debug, thiserror::Error)]
pub enum CleanupFilterError {
    /// Job name pattern fails to compile.
    #[error("invalid cleanup job pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Cleanup error types.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    /// Jenkins request failed.
    #[error(transparent)]
    Jenkins(#[from] JenkinsError),

    /// Job document cannot be inspected.
    #[error(transparent)]
    Marker(#[from] JobError),
}

/// Friendly result alias :3
pub type Result<T, E = CleanupError> = std::result::Result<T, E>;
