// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{git_config, git_config_with, git_template, FakeJenkins, RepoFixture};

use autojobs::{
    config::RunOptions,
    job::{JobError, JobOutcome},
    scm::git::Git,
    sync::{SyncError, Synchronizer},
};

use anyhow::Result;
use indoc::{formatdoc, indoc};
use pretty_assertions::assert_eq;
use simple_test_case::test_case;
use std::collections::HashSet;
use tempfile::TempDir;

const TEMPLATE: &str = "master-job-git";

fn setup(branches: &[&str]) -> Result<(TempDir, RepoFixture)> {
    let dir = tempfile::tempdir()?;
    let repo = RepoFixture::new(dir.path())?;
    for branch in branches {
        repo.branch(branch)?;
    }

    Ok((dir, repo))
}

fn jenkins() -> FakeJenkins {
    FakeJenkins::default().with_job(TEMPLATE, &git_template(false))
}

fn managed_job(branch: &str, tag: Option<&str>) -> String {
    let tag = tag.map(|tag| format!("<tag>{tag}</tag>")).unwrap_or_default();
    format!(
        "<project><disabled>false</disabled><createdByJenkinsAutojobs><ref>{branch}</ref>{tag}</createdByJenkinsAutojobs></project>"
    )
}

#[test]
fn second_run_changes_nothing() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one", "feature/two"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    let first = Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(first.count(JobOutcome::Created), 2);
    assert_eq!(first.unmatched, vec!["refs/heads/main".to_string()]);
    assert!(jenkins.has_job("feature-one"));
    assert!(jenkins.has_job("feature-two"));

    let writes = jenkins.writes.borrow().len();
    let second = Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(second.count(JobOutcome::Unchanged), 2);
    assert_eq!(second.count(JobOutcome::Updated), 0);
    assert_eq!(jenkins.writes.borrow().len(), writes);

    Ok(())
}

#[test]
fn first_matching_rule_wins() -> Result<()> {
    let (_dir, repo) = setup(&["feature/bravo/four", "feature/alpha"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        refs:
          - 'refs/heads/feature/bravo/(.*)':
              namefmt: 'one-{0}'
          - 'refs/heads/feature/(.*)':
              namefmt: 'two-{0}'
    "#})?;
    let jenkins = jenkins();

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let bravo = report.job("refs/heads/feature/bravo/four").map(|job| job.name.as_str());
    let alpha = report.job("refs/heads/feature/alpha").map(|job| job.name.as_str());
    assert_eq!(bravo, Some("one-four"));
    assert_eq!(alpha, Some("two-alpha"));

    Ok(())
}

#[test]
fn job_names_never_contain_path_separator() -> Result<()> {
    let (_dir, repo) = setup(&["feature/a/b", "release/1.0"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        namesep: '_'
        refs:
          - 'refs/heads/feature/.*':
              namefmt: '{shortref-orig}'
          - 'refs/heads/release/.*'
    "#})?;
    let jenkins = jenkins();

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let names = report.jobs.iter().map(|job| job.name.clone()).collect::<HashSet<_>>();
    assert_eq!(
        names,
        HashSet::from(["feature_a_b".to_string(), "release_1.0".to_string()])
    );

    Ok(())
}

#[test]
fn ignored_branches_never_reach_jenkins() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one", "feature/two-nobuild"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        ignore:
          - 'refs/heads/feature/.*-nobuild'
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(report.ignored, vec!["refs/heads/feature/two-nobuild".to_string()]);
    assert!(report.job("refs/heads/feature/two-nobuild").is_none());
    assert!(jenkins.has_job("feature-one"));
    assert!(!jenkins.has_job("feature-two-nobuild"));

    Ok(())
}

fn cleanup_scenario(method: &str) -> Result<()> {
    let (_dir, repo) = setup(&["feature/one", "feature/two", "release/one"])?;
    let group1 = git_config(&repo.path(), &formatdoc! {r#"
        template: master-job-git
        tag: group1
        tag-method: {method}
        cleanup: group1
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let group2 = git_config(&repo.path(), &formatdoc! {r#"
        template: master-job-git
        tag: group2
        tag-method: {method}
        refs:
          - 'refs/heads/release/(.*)':
              namefmt: 'release-{{0}}'
    "#})?;
    let jenkins = jenkins().with_job("handmade", "<project><description></description></project>");

    let report = Synchronizer::new(&jenkins, &Git, &group1).run()?;
    assert_eq!(report.cleanup.map(|cleanup| cleanup.deleted), Some(vec![]));
    Synchronizer::new(&jenkins, &Git, &group2).run()?;
    assert!(jenkins.has_job("release-one"));

    repo.delete_branch("feature/two")?;
    repo.delete_branch("release/one")?;

    let report = Synchronizer::new(&jenkins, &Git, &group1).run()?;
    assert_eq!(
        report.cleanup.map(|cleanup| cleanup.deleted),
        Some(vec!["feature-two".to_string()])
    );
    assert!(jenkins.has_job("feature-one"));
    assert!(!jenkins.has_job("feature-two"));
    assert!(jenkins.has_job("release-one"));
    assert!(jenkins.has_job("handmade"));
    assert!(jenkins.has_job(TEMPLATE));

    Ok(())
}

#[test_case("element"; "element marker")]
#[test_case("description"; "description marker")]
#[test]
fn cleanup_removes_only_stale_jobs_with_tag(method: &str) {
    cleanup_scenario(method).unwrap();
}

#[test]
fn cleanup_without_tag_removes_every_stale_managed_job() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        cleanup: true
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins()
        .with_job("feature-gone", &managed_job("refs/heads/feature/gone", Some("group1")))
        .with_job("release-gone", &managed_job("refs/heads/release/gone", None))
        .with_job("handmade", "<project></project>");

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let deleted = report.cleanup.map(|cleanup| cleanup.deleted).unwrap_or_default();
    assert_eq!(
        deleted,
        vec!["feature-gone".to_string(), "release-gone".to_string()]
    );
    assert!(jenkins.has_job("feature-one"));
    assert!(jenkins.has_job("handmade"));

    Ok(())
}

#[test]
fn cleanup_filters_limit_universe() -> Result<()> {
    let (_dir, repo) = setup(&[])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        cleanup: true
        cleanup-filters:
          views: [Legacy]
          jobs: ['feature-.*']
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins()
        .with_view("Legacy", &["legacy-gone"])
        .with_job("legacy-gone", &managed_job("refs/heads/legacy", None))
        .with_job("feature-gone", &managed_job("refs/heads/feature/gone", None))
        .with_job("other-gone", &managed_job("refs/heads/other", None));

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let deleted = report.cleanup.map(|cleanup| cleanup.deleted).unwrap_or_default();
    assert_eq!(
        deleted,
        vec!["legacy-gone".to_string(), "feature-gone".to_string()]
    );
    assert!(jenkins.has_job("other-gone"));

    Ok(())
}

#[test]
fn cleanup_tolerates_permission_denied() -> Result<()> {
    let (_dir, repo) = setup(&[])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        cleanup: true
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = FakeJenkins {
        forbidden_reads: HashSet::from(["secret".to_string()]),
        forbidden_deletes: HashSet::from(["locked".to_string()]),
        ..Default::default()
    }
    .with_job(TEMPLATE, &git_template(false))
    .with_job("secret", &managed_job("refs/heads/secret", None))
    .with_job("locked", &managed_job("refs/heads/locked", None))
    .with_job("stale", &managed_job("refs/heads/stale", None));

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let cleanup = report.cleanup.unwrap_or_default();
    assert_eq!(cleanup.deleted, vec!["stale".to_string()]);
    assert_eq!(cleanup.forbidden_read, vec!["secret".to_string()]);
    assert_eq!(cleanup.forbidden_delete, vec!["locked".to_string()]);
    assert!(jenkins.has_job("secret"));
    assert!(jenkins.has_job("locked"));

    Ok(())
}

#[test]
fn sticky_enable_keeps_manual_state() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        enable: sticky
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = FakeJenkins::default().with_job(TEMPLATE, &git_template(true));

    Synchronizer::new(&jenkins, &Git, &config).run()?;
    let created = jenkins.config("feature-one").unwrap_or_default();
    assert!(created.contains("<disabled>true</disabled>"));

    jenkins.edit("feature-one", "<disabled>true</disabled>", "<disabled>false</disabled>");
    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(report.count(JobOutcome::Unchanged), 1);
    let kept = jenkins.config("feature-one").unwrap_or_default();
    assert!(kept.contains("<disabled>false</disabled>"));

    Ok(())
}

#[test]
fn forced_enable_overrides_template() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        enable: true
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = FakeJenkins::default().with_job(TEMPLATE, &git_template(true));

    Synchronizer::new(&jenkins, &Git, &config).run()?;
    let created = jenkins.config("feature-one").unwrap_or_default();
    assert!(created.contains("<disabled>false</disabled>"));

    Ok(())
}

#[test]
fn missing_template_aborts_before_any_branch() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: does-not-exist
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    let result = Synchronizer::new(&jenkins, &Git, &config).run();
    assert!(matches!(result, Err(SyncError::MissingTemplate { .. })));
    assert!(jenkins.writes.borrow().is_empty());
    assert!(!jenkins.has_job("feature-one"));

    Ok(())
}

#[test]
fn missing_view_aborts_before_any_branch() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        view: Nightly
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    let result = Synchronizer::new(&jenkins, &Git, &config).run();
    assert!(matches!(result, Err(SyncError::MissingView { .. })));
    assert!(jenkins.writes.borrow().is_empty());

    Ok(())
}

#[test]
fn all_view_is_never_queried() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        view: [Tests, All]
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins().with_view("Tests", &[]);

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let job = report.job("refs/heads/feature/one").cloned();
    assert_eq!(
        job.map(|job| job.views_added),
        Some(vec!["Tests".to_string()])
    );
    assert!(!jenkins
        .queried_views
        .borrow()
        .iter()
        .any(|view| view.eq_ignore_ascii_case("all")));

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let job = report.job("refs/heads/feature/one").cloned();
    assert_eq!(job.map(|job| job.views_added), Some(vec![]));

    Ok(())
}

#[test]
fn overwrite_disabled_leaves_existing_job() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        overwrite: false
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let existing = "<project><disabled>false</disabled></project>";
    let jenkins = jenkins().with_job("feature-one", existing);

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let job = report.job("refs/heads/feature/one").cloned();
    assert_eq!(job.map(|job| job.outcome), Some(JobOutcome::OverwriteDisabled));
    assert_eq!(jenkins.config("feature-one").as_deref(), Some(existing));

    Ok(())
}

#[test]
fn drifted_job_is_updated() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    Synchronizer::new(&jenkins, &Git, &config).run()?;
    jenkins.edit("feature-one", "echo", "echo drifted &amp;&amp;");

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(report.count(JobOutcome::Updated), 1);
    let restored = jenkins.config("feature-one").unwrap_or_default();
    assert!(!restored.contains("drifted"));

    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let config = git_config_with(
        &repo.path(),
        indoc! {r#"
            template: master-job-git
            build-on-create: true
            cleanup: true
            refs:
              - 'refs/heads/feature/(.*)'
        "#},
        &options,
    )?;
    let jenkins = jenkins().with_job("stale", &managed_job("refs/heads/stale", None));

    let report = Synchronizer::new(&jenkins, &Git, &config).run()?;
    let job = report.job("refs/heads/feature/one").cloned();
    assert_eq!(job.as_ref().map(|job| job.outcome), Some(JobOutcome::Created));
    assert_eq!(job.map(|job| job.build_triggered), Some(true));
    assert_eq!(
        report.cleanup.map(|cleanup| cleanup.deleted),
        Some(vec!["stale".to_string()])
    );
    assert!(jenkins.writes.borrow().is_empty());
    assert!(jenkins.has_job("stale"));

    Ok(())
}

#[test]
fn build_triggered_only_on_create() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        build-on-create: true
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    Synchronizer::new(&jenkins, &Git, &config).run()?;
    Synchronizer::new(&jenkins, &Git, &config).run()?;
    assert_eq!(*jenkins.builds.borrow(), vec!["feature-one".to_string()]);

    Ok(())
}

#[test]
fn template_for_other_scm_aborts() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: svn-template
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = FakeJenkins::default().with_job(
        "svn-template",
        r#"<project><scm class="hudson.scm.SubversionSCM"></scm></project>"#,
    );

    let result = Synchronizer::new(&jenkins, &Git, &config).run();
    assert!(matches!(
        result,
        Err(SyncError::Branch {
            source: JobError::TemplateMismatch { .. },
            ..
        })
    ));
    assert!(jenkins.writes.borrow().is_empty());

    Ok(())
}

#[test]
fn substitute_renders_into_text_nodes() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        namefmt: 'ci-{0}'
        substitute:
          '@@JOB_NAME@@': '{job_name} ({shortref-orig})'
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    Synchronizer::new(&jenkins, &Git, &config).run()?;
    let created = jenkins.config("ci-one").unwrap_or_default();
    assert!(created.contains("<command>echo ci-one (feature/one)</command>"));
    assert!(created.contains("<name>feature/one</name>"));
    assert!(created.contains("<localBranch>feature/one</localBranch>"));

    Ok(())
}

#[test]
fn undefined_placeholder_aborts() -> Result<()> {
    let (_dir, repo) = setup(&["feature/one"])?;
    let config = git_config(&repo.path(), indoc! {r#"
        template: master-job-git
        namefmt: '{nope}'
        refs:
          - 'refs/heads/feature/(.*)'
    "#})?;
    let jenkins = jenkins();

    let result = Synchronizer::new(&jenkins, &Git, &config).run();
    assert!(matches!(
        result,
        Err(SyncError::Branch {
            source: JobError::Format(_),
            ..
        })
    ));

    Ok(())
}
