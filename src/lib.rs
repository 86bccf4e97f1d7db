// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep Jenkins jobs in step with the branches of a repository.
//!
//! Autojobs lists the branches of a Git, Mercurial, or Subversion repository,
//! matches each one against an ordered set of rules, and creates or updates a
//! Jenkins job per matching branch by cloning a template job. Jobs whose
//! branch disappeared can be removed again, but only if autojobs created them
//! in the first place.
//!
//! # Flow
//!
//! 1. [`config`] parses the YAML document and compiles it into a
//!    [`config::Config`].
//! 2. An [`scm::Scm`] adapter lists branches.
//! 3. [`rules::IgnoreFilter`] drops excluded branches, and
//!    [`rules::RuleTable::resolve`] finds the settings of the rest.
//! 4. [`job::Job`] turns the template into the job of one branch and commits
//!    it through a [`jenkins::JenkinsApi`].
//! 5. [`cleanup::Cleanup`] removes stale managed jobs.
//!
//! [`sync::Synchronizer`] ties these together into a single pass.

pub mod cleanup;
pub mod config;
pub mod jenkins;
pub mod job;
pub mod name;
pub mod rules;
pub mod scm;
pub mod sync;
pub mod xml;
