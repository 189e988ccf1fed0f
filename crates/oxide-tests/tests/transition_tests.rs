//! Tests for the approve, decline, and restart stage transitions.

use oxide_core::build::{Build, Stage};
use oxide_core::ids::BuildId;
use oxide_core::ports::Triggerer;
use oxide_core::{Error, Status};
use oxide_tests::fakes::Write;
use oxide_tests::*;
use pretty_assertions::assert_eq;

/// Seed a build with the given `(name, status, depends_on)` stages,
/// numbered in order.
fn seed(ctx: &TestContext, status: Status, stages: &[(&str, Status, &[&str])]) -> (Build, Vec<Stage>) {
    let build = BuildFixture::with_status(&ctx.repo, status);
    let stages: Vec<Stage> = stages
        .iter()
        .enumerate()
        .map(|(i, (name, status, deps))| BuildFixture::stage(&build, i as u32 + 1, name, *status, deps))
        .collect();
    ctx.store.seed(build.clone(), stages.clone(), vec![]);
    (build, stages)
}

#[tokio::test]
async fn test_approve_blocked_stage() {
    let ctx = TestContext::new();
    let (build, _) = seed(&ctx, Status::Blocked, &[("deploy", Status::Blocked, &[])]);

    let stage = ctx.transitions().approve(build.id, 1).await.unwrap();

    assert_eq!(stage.status, Status::Pending);
    assert_eq!(
        ctx.store.stage(build.id, "deploy").unwrap().status,
        Status::Pending
    );
    assert_eq!(ctx.store.writes(), vec![Write::UpdateStage("deploy".to_string())]);
    assert_eq!(ctx.scheduler.scheduled_names(), vec!["deploy"]);
}

#[tokio::test]
async fn test_approve_rejects_unblocked_stage() {
    let ctx = TestContext::new();
    let (build, _) = seed(&ctx, Status::Running, &[("deploy", Status::Pending, &[])]);

    let err = ctx.transitions().approve(build.id, 1).await.unwrap_err();

    assert!(matches!(
        err,
        Error::InvalidTransition {
            action: "approve",
            status: Status::Pending
        }
    ));
    assert_eq!(err.to_string(), "Cannot approve a Pipeline with Status \"pending\"");
    assert!(ctx.store.writes().is_empty());
    assert!(ctx.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn test_decline_blocked_stage() {
    let ctx = TestContext::new();
    let (build, _) = seed(&ctx, Status::Blocked, &[("deploy", Status::Blocked, &[])]);

    let stage = ctx.transitions().decline(build.id, 1).await.unwrap();

    assert_eq!(stage.status, Status::Declined);
    assert_eq!(ctx.store.build(build.id).unwrap().status, Status::Declined);
    assert_eq!(
        ctx.store.writes(),
        vec![
            Write::UpdateStage("deploy".to_string()),
            Write::UpdateBuild(build.id),
        ]
    );
    assert!(ctx.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn test_decline_rejects_unblocked_stage() {
    let ctx = TestContext::new();
    let (build, _) = seed(&ctx, Status::Running, &[("deploy", Status::Running, &[])]);

    let err = ctx.transitions().decline(build.id, 1).await.unwrap_err();

    assert_eq!(err.to_string(), "Cannot decline a Pipeline with Status \"running\"");
    assert!(ctx.store.writes().is_empty());
    assert_eq!(ctx.store.build(build.id).unwrap().status, Status::Running);
}

#[tokio::test]
async fn test_restart_cascades_to_descendants() {
    let ctx = TestContext::new();
    let (build, stages) = seed(
        &ctx,
        Status::Failing,
        &[
            ("s1", Status::Failing, &[]),
            ("s2", Status::Skipped, &["s1"]),
            ("s3", Status::Passing, &["s2"]),
            ("lint", Status::Passing, &[]),
        ],
    );
    let steps = vec![
        BuildFixture::finished_step(&stages[0], 1, "clone", Status::Passing),
        BuildFixture::finished_step(&stages[0], 2, "test", Status::Failing),
    ];
    ctx.store.seed(build.clone(), vec![], steps.clone());

    let stage = ctx.transitions().restart(build.id, 1).await.unwrap();

    assert_eq!(stage.status, Status::Pending);
    assert_eq!(
        stage_statuses(&ctx.store, build.id),
        vec![
            ("s1".to_string(), Status::Pending),
            ("s2".to_string(), Status::Waiting),
            ("s3".to_string(), Status::Waiting),
            ("lint".to_string(), Status::Passing),
        ]
    );

    for name in ["s1", "s2", "s3"] {
        let stage = ctx.store.stage(build.id, name).unwrap();
        assert!(stage.machine.is_empty(), "{} machine", name);
        assert_eq!(stage.exit_code, 0, "{} exit code", name);
        assert!(stage.started.is_none() && stage.stopped.is_none(), "{} times", name);
    }
    let lint = ctx.store.stage(build.id, "lint").unwrap();
    assert_eq!(lint.machine, "runner-01");

    for step in ctx.store.steps(stages[0].id) {
        assert_eq!(step.status, Status::Pending);
        assert_eq!(step.exit_code, 0);
        assert!(step.started.is_none());
    }

    assert_eq!(
        ctx.store.writes(),
        vec![
            Write::UpdateStep(steps[0].id),
            Write::DeleteLogs(steps[0].id),
            Write::UpdateStep(steps[1].id),
            Write::DeleteLogs(steps[1].id),
            Write::UpdateStage("s1".to_string()),
            Write::UpdateStage("s2".to_string()),
            Write::UpdateStage("s3".to_string()),
        ]
    );
    assert_eq!(ctx.scheduler.scheduled_names(), vec!["s1"]);
}

#[tokio::test]
async fn test_restart_diamond_resets_each_descendant_once() {
    let ctx = TestContext::new();
    let (build, _) = seed(
        &ctx,
        Status::Passing,
        &[
            ("a", Status::Passing, &[]),
            ("b", Status::Passing, &["a"]),
            ("c", Status::Passing, &["a"]),
            ("d", Status::Passing, &["b", "c"]),
        ],
    );

    ctx.transitions().restart(build.id, 1).await.unwrap();

    assert_eq!(
        ctx.store.writes(),
        vec![
            Write::UpdateStage("a".to_string()),
            Write::UpdateStage("b".to_string()),
            Write::UpdateStage("c".to_string()),
            Write::UpdateStage("d".to_string()),
        ]
    );
    assert_eq!(ctx.scheduler.scheduled_names(), vec!["a"]);
}

#[tokio::test]
async fn test_restart_rejects_non_terminal_stage() {
    for status in [
        Status::Pending,
        Status::Running,
        Status::Waiting,
        Status::Blocked,
        Status::Declined,
    ] {
        let ctx = TestContext::new();
        let (build, _) = seed(&ctx, Status::Running, &[("build", status, &[])]);

        let err = ctx.transitions().restart(build.id, 1).await.unwrap_err();

        assert!(
            matches!(err, Error::InvalidTransition { action: "restart", .. }),
            "{} should not be restartable",
            status
        );
        assert!(ctx.store.writes().is_empty());
        assert!(ctx.scheduler.scheduled().is_empty());
    }
}

#[tokio::test]
async fn test_restart_rejects_gated_build() {
    for status in [Status::Blocked, Status::Declined] {
        let ctx = TestContext::new();
        let (build, _) = seed(&ctx, status, &[("build", Status::Failing, &[])]);

        let err = ctx.transitions().restart(build.id, 1).await.unwrap_err();

        assert!(matches!(err, Error::InvalidBuildTransition { action: "restart", .. }));
        assert!(ctx.store.writes().is_empty());
    }
}

#[tokio::test]
async fn test_restart_partial_failure_keeps_earlier_updates() {
    let ctx = TestContext::new();
    let (build, _) = seed(
        &ctx,
        Status::Failing,
        &[
            ("s1", Status::Failing, &[]),
            ("s2", Status::Passing, &["s1"]),
            ("s3", Status::Passing, &["s2"]),
        ],
    );
    ctx.store.fail_stage_updates("s3");

    let result = ctx.transitions().restart(build.id, 1).await;

    assert!(matches!(result, Err(Error::Database(_))));
    assert_eq!(
        stage_statuses(&ctx.store, build.id),
        vec![
            ("s1".to_string(), Status::Pending),
            ("s2".to_string(), Status::Waiting),
            ("s3".to_string(), Status::Passing),
        ]
    );
    assert!(ctx.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn test_unknown_build_or_stage() {
    let ctx = TestContext::new();
    let (build, _) = seed(&ctx, Status::Blocked, &[("deploy", Status::Blocked, &[])]);

    let err = ctx.transitions().approve(BuildId::new(), 1).await.unwrap_err();
    assert!(matches!(err, Error::BuildNotFound(_)));

    let err = ctx.transitions().decline(build.id, 7).await.unwrap_err();
    assert!(matches!(err, Error::StageNotFound(_)));

    assert!(ctx.store.writes().is_empty());
}

#[tokio::test]
async fn test_approved_stage_after_blocked_trigger() {
    let mut ctx = TestContext::with_yaml(SIMPLE_YAML);
    ctx.repo.protected = true;

    let build = ctx
        .triggerer()
        .trigger(&ctx.repo, &HookFixture::push())
        .await
        .unwrap()
        .unwrap();
    assert!(ctx.scheduler.scheduled().is_empty());

    let stage = ctx.transitions().approve(build.id, 1).await.unwrap();
    assert_eq!(stage.status, Status::Pending);
    assert_eq!(ctx.scheduler.scheduled_names(), vec!["default"]);
}
