// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod sync;

use autojobs::{
    config::{Config, RawConfig, RunOptions},
    jenkins::{JenkinsApi, JenkinsError, Result as JenkinsResult},
    scm::ScmKind,
};

use anyhow::Result;
use git2::{BranchType, IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use indexmap::IndexMap;
use std::{
    cell::RefCell,
    collections::HashSet,
    path::Path,
};

pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        let fixture = Self { repo };
        fixture.stage_and_commit("README", "fixture")?;

        Ok(fixture)
    }

    pub(crate) fn path(&self) -> String {
        self.repo
            .workdir()
            .unwrap_or_else(|| self.repo.path())
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().as_os_str().to_string_lossy().into_owned().into_bytes(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }

    pub(crate) fn branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, false)?;
        Ok(())
    }

    pub(crate) fn delete_branch(&self, name: &str) -> Result<()> {
        self.repo.find_branch(name, BranchType::Local)?.delete()?;
        Ok(())
    }
}

/// In-memory Jenkins server.
#[derive(Debug, Default)]
pub(crate) struct FakeJenkins {
    pub(crate) jobs: RefCell<IndexMap<String, String>>,
    pub(crate) views: RefCell<IndexMap<String, Vec<String>>>,
    pub(crate) builds: RefCell<Vec<String>>,
    pub(crate) writes: RefCell<Vec<String>>,
    pub(crate) queried_views: RefCell<Vec<String>>,
    pub(crate) forbidden_reads: HashSet<String>,
    pub(crate) forbidden_deletes: HashSet<String>,
}

impl FakeJenkins {
    pub(crate) fn with_job(self, name: &str, config: &str) -> Self {
        self.jobs.borrow_mut().insert(name.into(), config.into());
        self
    }

    pub(crate) fn with_view(self, name: &str, jobs: &[&str]) -> Self {
        let jobs = jobs.iter().map(ToString::to_string).collect();
        self.views.borrow_mut().insert(name.into(), jobs);
        self
    }

    pub(crate) fn config(&self, name: &str) -> Option<String> {
        self.jobs.borrow().get(name).cloned()
    }

    pub(crate) fn has_job(&self, name: &str) -> bool {
        self.jobs.borrow().contains_key(name)
    }

    pub(crate) fn edit(&self, name: &str, from: &str, to: &str) {
        if let Some(config) = self.jobs.borrow_mut().get_mut(name) {
            *config = config.replace(from, to);
        }
    }

    fn forbidden(name: &str) -> JenkinsError {
        JenkinsError::Forbidden {
            url: format!("http://jenkins/job/{name}"),
        }
    }

    fn missing(name: &str) -> JenkinsError {
        JenkinsError::Status {
            status: 404,
            url: format!("http://jenkins/job/{name}"),
        }
    }
}

impl JenkinsApi for FakeJenkins {
    fn job_exists(&self, name: &str) -> JenkinsResult<bool> {
        Ok(self.has_job(name))
    }

    fn job_config(&self, name: &str) -> JenkinsResult<Option<String>> {
        if self.forbidden_reads.contains(name) {
            return Err(Self::forbidden(name));
        }

        Ok(self.config(name))
    }

    fn create_job(&self, name: &str, config: &str) -> JenkinsResult<()> {
        self.writes.borrow_mut().push(format!("create {name}"));
        self.jobs.borrow_mut().insert(name.into(), config.into());
        Ok(())
    }

    fn update_job(&self, name: &str, config: &str) -> JenkinsResult<()> {
        self.writes.borrow_mut().push(format!("update {name}"));
        match self.jobs.borrow_mut().get_mut(name) {
            Some(existing) => {
                *existing = config.into();
                Ok(())
            }
            None => Err(Self::missing(name)),
        }
    }

    fn delete_job(&self, name: &str) -> JenkinsResult<()> {
        if self.forbidden_deletes.contains(name) {
            return Err(Self::forbidden(name));
        }

        self.writes.borrow_mut().push(format!("delete {name}"));
        match self.jobs.borrow_mut().shift_remove(name) {
            Some(_) => Ok(()),
            None => Err(Self::missing(name)),
        }
    }

    fn build_job(&self, name: &str) -> JenkinsResult<()> {
        self.writes.borrow_mut().push(format!("build {name}"));
        self.builds.borrow_mut().push(name.into());
        Ok(())
    }

    fn list_jobs(&self) -> JenkinsResult<Vec<String>> {
        Ok(self.jobs.borrow().keys().cloned().collect())
    }

    fn view_exists(&self, name: &str) -> JenkinsResult<bool> {
        self.queried_views.borrow_mut().push(name.into());
        Ok(self.views.borrow().contains_key(name))
    }

    fn view_jobs(&self, name: &str) -> JenkinsResult<Vec<String>> {
        self.queried_views.borrow_mut().push(name.into());
        self.views
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Self::missing(name))
    }

    fn add_job_to_view(&self, view: &str, job: &str) -> JenkinsResult<()> {
        self.writes.borrow_mut().push(format!("view {view} {job}"));
        match self.views.borrow_mut().get_mut(view) {
            Some(jobs) => {
                jobs.push(job.into());
                Ok(())
            }
            None => Err(Self::missing(view)),
        }
    }
}

/// Git template job with a substitution placeholder in its build step.
pub(crate) fn git_template(disabled: bool) -> String {
    format!(
        r#"<?xml version='1.1' encoding='UTF-8'?>
<project>
  <description></description>
  <keepDependencies>false</keepDependencies>
  <scm class="hudson.plugins.git.GitSCM" plugin="git@4.0">
    <configVersion>2</configVersion>
    <branches>
      <hudson.plugins.git.BranchSpec>
        <name>main</name>
      </hudson.plugins.git.BranchSpec>
    </branches>
  </scm>
  <disabled>{disabled}</disabled>
  <builders>
    <hudson.tasks.Shell>
      <command>echo @@JOB_NAME@@</command>
    </hudson.tasks.Shell>
  </builders>
</project>
"#
    )
}

/// Compile configuration document for git repository at `repo`.
pub(crate) fn git_config(repo: &str, document: &str) -> Result<Config> {
    let raw: RawConfig = format!("repo: {repo}\njenkins: http://jenkins\n{document}").parse()?;
    Ok(raw.compile(ScmKind::Git, &RunOptions::default())?)
}

/// Compile configuration document with command-line options.
pub(crate) fn git_config_with(repo: &str, document: &str, options: &RunOptions) -> Result<Config> {
    let raw: RawConfig = format!("repo: {repo}\njenkins: http://jenkins\n{document}").parse()?;
    Ok(raw.compile(ScmKind::Git, options)?)
}
