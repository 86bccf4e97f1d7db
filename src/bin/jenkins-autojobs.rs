// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use autojobs::{
    config::{RawConfig, RunOptions},
    jenkins::HttpJenkins,
    job::JobOutcome,
    scm::{git::Git, hg::Hg, svn::Svn, Scm},
    sync::Synchronizer,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use std::{fs, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "jenkins-autojobs [options] <git|hg|svn> <config.yaml>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Git(opts) => run_sync(&Git::new(), opts),
            Command::Hg(opts) => run_sync(&Hg::new(), opts),
            Command::Svn(opts) => run_sync(&Svn::new(), opts),
        }
    }

    fn debug(&self) -> bool {
        match &self.command {
            Command::Git(opts) | Command::Hg(opts) | Command::Svn(opts) => opts.debug,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create jobs for the refs of a git repository.
    #[command(override_usage = "jenkins-autojobs git [options] <config.yaml>")]
    Git(SyncOptions),

    /// Create jobs for the branches of a mercurial repository.
    #[command(override_usage = "jenkins-autojobs hg [options] <config.yaml>")]
    Hg(SyncOptions),

    /// Create jobs for the branches of a subversion repository.
    #[command(override_usage = "jenkins-autojobs svn [options] <config.yaml>")]
    Svn(SyncOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Path to YAML configuration.
    #[arg(required = true, value_name = "config.yaml")]
    pub config: PathBuf,

    /// Show what would be done without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Log effective configuration of every branch.
    #[arg(short, long)]
    pub debug: bool,

    /// Repository location, overrides configuration.
    #[arg(short, long, value_name = "url")]
    pub repo: Option<String>,

    /// Jenkins URL, overrides configuration.
    #[arg(short, long, value_name = "url")]
    pub jenkins: Option<String>,

    /// Jenkins username.
    #[arg(short, long, value_name = "user", group = "jenkins_user")]
    pub username: Option<String>,

    /// Jenkins password or API token.
    #[arg(short, long, value_name = "pass", group = "jenkins_pass")]
    pub password: Option<String>,

    /// Prompt for Jenkins username.
    #[arg(short = 'U', group = "jenkins_user")]
    pub prompt_username: bool,

    /// Prompt for Jenkins password.
    #[arg(short = 'P', group = "jenkins_pass")]
    pub prompt_password: bool,

    /// Repository username.
    #[arg(short = 'y', long, value_name = "user", group = "scm_user")]
    pub scm_username: Option<String>,

    /// Repository password.
    #[arg(short = 'o', long, value_name = "pass", group = "scm_pass")]
    pub scm_password: Option<String>,

    /// Prompt for repository username.
    #[arg(short = 'Y', group = "scm_user")]
    pub prompt_scm_username: bool,

    /// Prompt for repository password.
    #[arg(short = 'O', group = "scm_pass")]
    pub prompt_scm_password: bool,
}

impl SyncOptions {
    fn run_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            dry_run: self.dry_run,
            debug: self.debug,
            repo: self.repo.clone(),
            jenkins: self.jenkins.clone(),
            scm_username: prompt_text(&self.scm_username, self.prompt_scm_username, "repository username")?,
            scm_password: prompt_secret(&self.scm_password, self.prompt_scm_password, "repository password")?,
        })
    }

    fn jenkins_credentials(&self) -> Result<(Option<String>, Option<String>)> {
        let username = prompt_text(&self.username, self.prompt_username, "jenkins username")?;
        let password = prompt_secret(&self.password, self.prompt_password, "jenkins password")?;
        Ok((username, password))
    }
}

fn prompt_text(value: &Option<String>, prompt: bool, message: &str) -> Result<Option<String>> {
    if prompt {
        return Ok(Some(Text::new(message).prompt()?));
    }

    Ok(value.clone())
}

fn prompt_secret(value: &Option<String>, prompt: bool, message: &str) -> Result<Option<String>> {
    if prompt {
        return Ok(Some(Password::new(message).without_confirmation().prompt()?));
    }

    Ok(value.clone())
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = if cli.debug() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_sync(scm: &dyn Scm, opts: SyncOptions) -> Result<()> {
    let options = opts.run_options()?;
    let data = fs::read_to_string(&opts.config)
        .with_context(|| format!("failed to read configuration {:?}", opts.config))?;
    let raw: RawConfig = data.parse()?;
    let config = raw.compile(scm.kind(), &options)?;

    let (username, password) = opts.jenkins_credentials()?;
    let jenkins = HttpJenkins::connect(&config.jenkins, username.as_deref(), password.as_deref())
        .with_context(|| format!("failed to connect to {}", config.jenkins))?;

    let report = Synchronizer::new(&jenkins, scm, &config).run()?;
    info!(
        "{} created, {} updated, {} unchanged, {} skipped, {} ignored, {} unmatched",
        report.count(JobOutcome::Created),
        report.count(JobOutcome::Updated),
        report.count(JobOutcome::Unchanged),
        report.count(JobOutcome::OverwriteDisabled),
        report.ignored.len(),
        report.unmatched.len(),
    );
    if let Some(cleanup) = report.cleanup {
        info!(
            "{} removed, {} unreadable, {} not removable",
            cleanup.deleted.len(),
            cleanup.forbidden_read.len(),
            cleanup.forbidden_delete.len(),
        );
    }

    Ok(())
}
