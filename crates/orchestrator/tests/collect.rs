mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use scalekit_orchestrator::{OrchestratorError, PointStatus};

use common::{Behaviour, ScriptedBackend};

#[tokio::test]
async fn manual_run_collected_later_matches_automatic_run() {
    let automatic_state = tempfile::tempdir().unwrap();
    let automatic = common::orchestrator(automatic_state.path(), Arc::new(ScriptedBackend::new()))
        .run(&common::sweep_options())
        .await
        .unwrap();

    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let mut options = common::sweep_options();
    options.manual = true;
    let submitted = common::orchestrator(state.path(), backend.clone())
        .run(&options)
        .await
        .unwrap();
    assert!(submitted.dataset.is_empty());

    // A separate invocation that only knows the run id.
    let collected = common::resumed(state.path(), &submitted.run_id, backend)
        .collect(None)
        .await
        .unwrap();

    assert_eq!(collected.run_id, submitted.run_id);
    assert!(!collected.report.manual);
    assert!(collected.report.is_success());
    assert_eq!(collected.dataset, automatic.dataset);
}

#[tokio::test]
async fn archived_runs_are_reused_without_polling() {
    let state = tempfile::tempdir().unwrap();
    let first = common::orchestrator(state.path(), Arc::new(ScriptedBackend::new()))
        .run(&common::sweep_options())
        .await
        .unwrap();

    // The new backend knows none of the jobs; any poll would fail.
    let again = common::resumed(state.path(), &first.run_id, Arc::new(ScriptedBackend::new()))
        .collect(None)
        .await
        .unwrap();

    assert_eq!(again.dataset, first.dataset);
    assert!(again
        .report
        .entries
        .iter()
        .all(|e| e.status == PointStatus::Collected));
}

#[tokio::test]
async fn timed_out_jobs_stay_timed_out() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(2, Behaviour::Hang));
    let first = common::orchestrator(state.path(), backend.clone())
        .run(&common::sweep_options())
        .await
        .unwrap();

    let again = common::resumed(state.path(), &first.run_id, backend)
        .collect(None)
        .await
        .unwrap();

    let entry = again
        .report
        .entries
        .iter()
        .find(|e| e.point.processes == 2)
        .unwrap();
    assert_eq!(entry.status, PointStatus::TimedOut);
    assert_eq!(again.dataset.len(), 3);
}

#[tokio::test]
async fn cancelled_jobs_are_picked_up_by_collect() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    // Cancelled before the sweep starts: every job is submitted, polled at
    // most once, and left running.
    orchestrator.context().cancel.cancel();
    let first = orchestrator.run(&common::sweep_options()).await.unwrap();
    assert!(first
        .report
        .entries
        .iter()
        .all(|e| e.status == PointStatus::Cancelled));
    assert!(first.dataset.is_empty());

    let collected = common::resumed(state.path(), &first.run_id, backend)
        .collect(None)
        .await
        .unwrap();

    assert_eq!(collected.dataset.len(), 4);
    assert!(collected.report.is_success());
}

#[tokio::test]
async fn keep_flag_overrides_recorded_option() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let mut options = common::sweep_options();
    options.manual = true;
    let submitted = common::orchestrator(state.path(), backend.clone())
        .run(&options)
        .await
        .unwrap();

    common::resumed(state.path(), &submitted.run_id, backend.clone())
        .collect(Some(true))
        .await
        .unwrap();

    assert!(backend.deleted().is_empty());
    assert_eq!(backend.file_count(), 4);
}

#[tokio::test]
async fn unknown_run_is_rejected() {
    let state = tempfile::tempdir().unwrap();
    let result = common::resumed(state.path(), "no-such-run", Arc::new(ScriptedBackend::new()))
        .collect(None)
        .await;

    assert_matches!(result, Err(OrchestratorError::Records(_)));
}
