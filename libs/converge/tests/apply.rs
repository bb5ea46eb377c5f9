mod harness;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use harness::{
    context, control_plane, entries, worker, Calls, FakeConnector, FakeNode, Journal,
    ScriptedPrompter, StaticRenderer,
};
use herd_converge::apply::{self, ApplyOptions, ApplyOutcome};
use herd_converge::bootstrap::BootstrapOutcome;
use herd_converge::stabilize::STABLE_WINDOW;
use herd_converge::{Error, Operation};

fn no_confirm() -> ApplyOptions {
    ApplyOptions {
        confirm: false,
        ..ApplyOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn commit_failure_stops_before_next_node() {
    let a = Arc::new(FakeNode::running());
    let b = Arc::new(FakeNode::running());
    let c = Arc::new(FakeNode::running());
    b.fail_commit.store(true, Ordering::SeqCst);

    let connector = Arc::new(
        FakeConnector::default()
            .with("a", a.clone())
            .with("b", b.clone())
            .with("c", c.clone()),
    );
    let ctx = context(
        vec![control_plane("a"), control_plane("b"), control_plane("c")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let err = apply::run(&ctx, &no_confirm()).await.unwrap_err();

    assert!(matches!(err, Error::Apply { ref host, .. } if host == "b"));
    assert_eq!(Calls::get(&a.calls.commits), 1);
    assert_eq!(Calls::get(&b.calls.commits), 1);
    assert_eq!(Calls::get(&c.calls.dry_runs), 0);
    assert_eq!(Calls::get(&c.calls.commits), 0);
    // Committed before the failure, so already settled.
    assert_eq!(Calls::get(&a.calls.subscriptions), 1);
    assert_eq!(Calls::get(&b.calls.subscriptions), 0);
}

#[tokio::test(start_paused = true)]
async fn each_node_settles_before_the_next_is_applied() {
    let journal = Journal::default();
    let a = Arc::new(FakeNode::running().journaled("a", &journal));
    let b = Arc::new(FakeNode::running().journaled("b", &journal));

    let connector = Arc::new(
        FakeConnector::default()
            .with("a", a.clone())
            .with("b", b.clone()),
    );
    let ctx = context(
        vec![control_plane("a"), control_plane("b")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let started = tokio::time::Instant::now();
    apply::run(&ctx, &no_confirm()).await.unwrap();

    let calls = entries(&journal);
    let position = |entry: &str| calls.iter().position(|e| e == entry).unwrap();

    assert!(position("a:commit") < position("a:subscribe"));
    assert!(position("a:subscribe") < position("b:dry-run"));
    assert!(position("b:commit") < position("b:subscribe"));
    assert!(started.elapsed() >= STABLE_WINDOW * 2);
}

#[tokio::test]
async fn identical_config_is_a_no_op_the_second_time() {
    let node = Arc::new(FakeNode::maintenance());
    let connector = Arc::new(FakeConnector::default().with("cp-1", node.clone()));
    let ctx = context(
        vec![control_plane("cp-1")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let first = apply::run(&ctx, &no_confirm()).await.unwrap();
    assert_eq!(first.outcomes, vec![("cp-1".to_string(), ApplyOutcome::CHANGED)]);

    let second = apply::run(&ctx, &no_confirm()).await.unwrap();
    assert_eq!(second.outcomes, vec![("cp-1".to_string(), ApplyOutcome::UNCHANGED)]);

    assert_eq!(Calls::get(&node.calls.commits), 1);
    assert_eq!(
        node.applied().unwrap(),
        StaticRenderer::default().config_for("cp-1")
    );
}

#[tokio::test]
async fn all_maintenance_skips_stabilization() {
    let a = Arc::new(FakeNode::maintenance());
    let b = Arc::new(FakeNode::maintenance());
    let connector = Arc::new(
        FakeConnector::default()
            .with("cp-1", a.clone())
            .with("w-1", b.clone()),
    );
    let ctx = context(
        vec![control_plane("cp-1"), worker("w-1")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let report = apply::run(&ctx, &no_confirm()).await.unwrap();

    assert_eq!(report.changed(), 2);
    assert_eq!(Calls::get(&a.calls.subscriptions), 0);
    assert_eq!(Calls::get(&b.calls.subscriptions), 0);
}

#[tokio::test(start_paused = true)]
async fn changed_running_nodes_are_stabilized() {
    let node = Arc::new(FakeNode::running());
    let connector = Arc::new(FakeConnector::default().with("cp-1", node.clone()));
    let ctx = context(
        vec![control_plane("cp-1")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let started = tokio::time::Instant::now();
    apply::run(&ctx, &no_confirm()).await.unwrap();

    assert_eq!(Calls::get(&node.calls.subscriptions), 1);
    assert!(started.elapsed() >= STABLE_WINDOW);
}

#[tokio::test]
async fn dry_run_shows_changes_without_committing() {
    let node = Arc::new(FakeNode::running());
    let prompter = Arc::new(ScriptedPrompter::default());
    let connector = Arc::new(FakeConnector::default().with("cp-1", node.clone()));
    let ctx = context(vec![control_plane("cp-1")], connector, prompter.clone());

    let options = ApplyOptions {
        dry_run: true,
        auto_bootstrap: true,
        ..ApplyOptions::default()
    };
    let report = apply::run(&ctx, &options).await.unwrap();

    assert_eq!(report.changed(), 0);
    assert!(report.bootstrap.is_none());
    assert_eq!(Calls::get(&node.calls.dry_runs), 1);
    assert_eq!(Calls::get(&node.calls.commits), 0);
    assert_eq!(Calls::get(&node.calls.subscriptions), 0);
    assert_eq!(prompter.shown.lock().unwrap().len(), 1);
    assert!(prompter.questions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn declining_skips_only_that_node() {
    let a = Arc::new(FakeNode::maintenance());
    let b = Arc::new(FakeNode::maintenance());
    let prompter = Arc::new(ScriptedPrompter::answering(&[false, true]));
    let connector = Arc::new(
        FakeConnector::default()
            .with("cp-1", a.clone())
            .with("cp-2", b.clone()),
    );
    let ctx = context(
        vec![control_plane("cp-1"), control_plane("cp-2")],
        connector,
        prompter.clone(),
    );

    let report = apply::run(&ctx, &ApplyOptions::default()).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![
            ("cp-1".to_string(), ApplyOutcome::SKIPPED),
            ("cp-2".to_string(), ApplyOutcome::CHANGED),
        ]
    );
    assert_eq!(Calls::get(&a.calls.commits), 0);
    assert_eq!(Calls::get(&b.calls.commits), 1);

    let questions = prompter.questions.lock().unwrap();
    assert_eq!(
        questions[0],
        "Do you want to apply the above changes to cp-1 (Mode: auto)?"
    );
}

#[tokio::test]
async fn unhealthy_node_aborts_before_any_apply() {
    let healthy = Arc::new(FakeNode::maintenance());
    let connector = Arc::new(FakeConnector::default().with("cp-1", healthy.clone()));
    let ctx = context(
        vec![control_plane("cp-1"), worker("w-unreachable")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let err = apply::run(&ctx, &no_confirm()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::PreflightFailed {
            operation: Operation::Apply
        }
    ));
    assert_eq!(Calls::get(&healthy.calls.dry_runs), 0);
}

#[tokio::test]
async fn skip_problematic_nodes_applies_the_rest() {
    let healthy = Arc::new(FakeNode::maintenance());
    let connector = Arc::new(FakeConnector::default().with("cp-1", healthy.clone()));
    let ctx = context(
        vec![control_plane("cp-1"), worker("w-unreachable")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let options = ApplyOptions {
        skip_problematic_nodes: true,
        ..no_confirm()
    };
    let report = apply::run(&ctx, &options).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(Calls::get(&healthy.calls.commits), 1);
}

#[tokio::test]
async fn auto_bootstrap_runs_once_after_apply() {
    let cp = Arc::new(FakeNode::maintenance().with_etcd("Preparing", 0));
    let w = Arc::new(FakeNode::maintenance());
    let connector = Arc::new(
        FakeConnector::default()
            .with("cp-1", cp.clone())
            .with("w-1", w.clone()),
    );
    let ctx = context(
        vec![worker("w-1"), control_plane("cp-1")],
        connector,
        Arc::new(ScriptedPrompter::default()),
    );

    let options = ApplyOptions {
        auto_bootstrap: true,
        ..no_confirm()
    };
    let report = apply::run(&ctx, &options).await.unwrap();

    assert_eq!(report.bootstrap, Some(BootstrapOutcome::Initiated));
    assert_eq!(Calls::get(&cp.calls.bootstraps), 1);
    assert_eq!(Calls::get(&w.calls.bootstraps), 0);
}
