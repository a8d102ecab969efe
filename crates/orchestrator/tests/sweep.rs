mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use scalekit_core::fitting::{fit_dataset, FitOptions};
use scalekit_core::phase::{Phase, Property};
use scalekit_orchestrator::{OrchestratorError, PointStatus};

use common::{Behaviour, ScriptedBackend};

fn status_of(outcome: &scalekit_orchestrator::SweepOutcome, processes: u32) -> &PointStatus {
    &outcome
        .report
        .entries
        .iter()
        .find(|e| e.point.processes == processes)
        .expect("entry for point")
        .status
}

// -- Automatic runs --

#[tokio::test]
async fn sweep_collects_every_finished_point() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(3, Behaviour::Hang));
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert_eq!(backend.submissions(), vec![1, 2, 3, 4]);
    assert_eq!(outcome.dataset.len(), 3);
    assert_eq!(outcome.report.points_with_data(), 3);
    assert_eq!(outcome.report.total_points(), 4);
    assert_eq!(status_of(&outcome, 3), &PointStatus::TimedOut);
    assert!(outcome.report.is_success());

    let processes: Vec<u32> = outcome.dataset.points().map(|(p, _)| p.processes).collect();
    assert_eq!(processes, vec![1, 2, 4]);

    // Every job is finished for good, nothing is left to collect.
    let records = &orchestrator.context().records;
    assert!(records.load_jobs(&outcome.run_id).unwrap().is_empty());
    assert_eq!(records.load_archived(&outcome.run_id).unwrap().len(), 4);

    // Collected output and the timed-out job's directory were removed.
    assert_eq!(backend.deleted().len(), 4);
    assert_eq!(backend.file_count(), 0);
}

#[tokio::test]
async fn sweep_dataset_fits_the_expected_scaling() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend);

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();
    assert_eq!(outcome.dataset.len(), 4);

    let fits = fit_dataset(&outcome.dataset, &FitOptions::default()).unwrap();
    let emission = fits.fit(Property::Runtime, Phase::StellarEmission).unwrap();
    let serial = emission.parameter("serial").unwrap();
    let overhead = emission.parameter("overhead").unwrap();
    assert!((serial - 10.0).abs() < 0.1, "serial = {serial}");
    assert!((overhead - 0.5).abs() < 0.05, "overhead = {overhead}");

    let series = fits.series(Property::Runtime, Phase::StellarEmission).unwrap();
    let at_four = series.points.iter().find(|p| p.x == 4).unwrap();
    let speedup = at_four.speedup.unwrap();
    assert!((speedup - 10.5 / 3.0).abs() < 0.01, "speedup = {speedup}");
}

#[tokio::test]
async fn failed_job_keeps_its_output() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(2, Behaviour::Fail));
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert_eq!(outcome.dataset.len(), 3);
    assert_matches!(
        status_of(&outcome, 2),
        PointStatus::MissingData(reason) if reason.contains("failed")
    );
    assert_eq!(backend.deleted().len(), 3);
    assert!(backend
        .deleted()
        .iter()
        .all(|dir| !dir.to_string_lossy().contains("-p2-")));
}

#[tokio::test]
async fn rejected_submission_does_not_stop_the_sweep() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(1, Behaviour::Reject));
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert_eq!(backend.submissions(), vec![1, 2, 3, 4]);
    assert_matches!(
        status_of(&outcome, 1),
        PointStatus::SubmissionFailed(reason) if reason.contains("queue full")
    );
    assert_eq!(outcome.report.accepted_jobs(), 3);
    assert_eq!(outcome.dataset.len(), 3);
    assert!(outcome.report.is_success());
}

#[tokio::test]
async fn sweep_fails_when_no_job_is_accepted() {
    let state = tempfile::tempdir().unwrap();
    let backend = (1..=4).fold(ScriptedBackend::new(), |b, p| b.with(p, Behaviour::Reject));
    let orchestrator = common::orchestrator(state.path(), Arc::new(backend));

    let result = orchestrator.run(&common::sweep_options()).await;

    assert_matches!(
        result,
        Err(OrchestratorError::NoJobsAccepted { host, .. }) if host == common::HOST_ID
    );
}

#[tokio::test]
async fn invalid_grid_fails_before_submission() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let mut options = common::sweep_options();
    options.grid.max_nodes = 8.0;
    let result = orchestrator.run(&options).await;

    assert_matches!(result, Err(OrchestratorError::Core(_)));
    assert!(backend.submissions().is_empty());
}

#[tokio::test]
async fn transient_poll_errors_are_retried() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(1, Behaviour::Flaky(2)));
    let orchestrator = common::orchestrator(state.path(), backend);

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert_eq!(status_of(&outcome, 1), &PointStatus::Collected);
    assert_eq!(outcome.dataset.len(), 4);
}

#[tokio::test]
async fn exhausted_poll_retries_abandon_the_job() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(4, Behaviour::Flaky(10)));
    let orchestrator = common::orchestrator(state.path(), backend);

    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert_matches!(
        status_of(&outcome, 4),
        PointStatus::MissingData(reason) if reason.contains("status unavailable")
    );
    assert_eq!(outcome.dataset.len(), 3);
}

#[tokio::test]
async fn repeats_share_a_point() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let mut options = common::sweep_options();
    options.repeats = 2;
    let outcome = orchestrator.run(&options).await.unwrap();

    assert_eq!(backend.submissions(), vec![1, 1, 2, 2, 3, 3, 4, 4]);
    assert_eq!(outcome.dataset.len(), 4);
    assert!(outcome.dataset.points().all(|(_, data)| data.runs.len() == 2));

    let point = *outcome.dataset.points().next().unwrap().0;
    let summary = outcome
        .dataset
        .summary(&point, Property::Runtime, Phase::StellarEmission)
        .unwrap();
    assert_eq!(summary.count, 2);
    assert!(summary.sigma.abs() < 1e-12);
}

#[tokio::test]
async fn weak_scaling_grows_the_workload() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend);

    let mut options = common::sweep_options();
    options.weak = true;
    let outcome = orchestrator.run(&options).await.unwrap();

    let packages: Vec<(u32, u64)> = outcome
        .dataset
        .points()
        .map(|(p, data)| (p.processes, data.runs[&0].size.packages))
        .collect();
    assert_eq!(
        packages,
        vec![(1, 100_000), (2, 200_000), (3, 300_000), (4, 400_000)]
    );
    assert!(outcome.dataset.is_heterogeneous());
}

#[tokio::test]
async fn progress_and_timeline_are_exported_per_job() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend);

    let mut options = common::sweep_options();
    options.progress = true;
    options.timeline = true;
    let outcome = orchestrator.run(&options).await.unwrap();

    assert_eq!(outcome.exports.len(), 4);
    for export in &outcome.exports {
        let processes: usize = export
            .name
            .split('-')
            .find_map(|part| part.strip_prefix('p'))
            .and_then(|n| n.parse().ok())
            .unwrap();
        // Two progress lines and three phases per rank.
        assert_eq!(export.progress.as_ref().unwrap().len(), 2 * processes);
        assert_eq!(export.timeline.as_ref().unwrap().len(), 3 * processes);
    }

    let out = tempfile::tempdir().unwrap();
    let written = scalekit_orchestrator::output::write_outcome(out.path(), &outcome, None).unwrap();
    assert!(out.path().join("dataset.json").is_file());
    assert!(out.path().join("report.txt").is_file());
    assert!(out.path().join("progress").is_dir());
    assert!(out.path().join("timeline").is_dir());
    assert_eq!(written.len(), 2 + 8);
}

// -- Manual mode and cancellation --

#[tokio::test]
async fn manual_mode_submits_and_returns() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let mut options = common::sweep_options();
    options.manual = true;
    let outcome = orchestrator.run(&options).await.unwrap();

    assert!(outcome.dataset.is_empty());
    assert!(outcome.report.is_success());
    assert!(outcome
        .report
        .entries
        .iter()
        .all(|e| e.status == PointStatus::Submitted));
    assert_eq!(
        orchestrator
            .context()
            .records
            .load_jobs(&outcome.run_id)
            .unwrap()
            .len(),
        4
    );
    assert!(backend.deleted().is_empty());
}

#[tokio::test]
async fn cancellation_leaves_jobs_recorded() {
    let state = tempfile::tempdir().unwrap();
    let backend = (1..=4).fold(ScriptedBackend::new(), |b, p| b.with(p, Behaviour::Hang));
    let orchestrator = common::orchestrator(state.path(), Arc::new(backend));

    let cancel = orchestrator.context().cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let outcome = orchestrator.run(&common::sweep_options()).await.unwrap();

    assert!(outcome
        .report
        .entries
        .iter()
        .all(|e| e.status == PointStatus::Cancelled));
    assert!(!outcome.report.is_success());
    assert_eq!(
        orchestrator
            .context()
            .records
            .load_jobs(&outcome.run_id)
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn accepted_jobs_are_recorded_while_a_submission_stalls() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(4, Behaviour::Stall));
    let orchestrator = common::orchestrator(state.path(), backend.clone());

    let mut options = common::sweep_options();
    options.manual = true;
    let run = tokio::time::timeout(Duration::from_millis(300), orchestrator.run(&options)).await;
    assert!(run.is_err(), "run returned although a submission never did");

    let records = orchestrator
        .context()
        .records
        .load_jobs(&orchestrator.context().run_id)
        .unwrap();
    let mut recorded: Vec<u32> = records.iter().map(|job| job.point.processes).collect();
    recorded.sort_unstable();
    assert_eq!(recorded, vec![1, 2, 3]);
    assert_eq!(backend.submissions(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_submission() {
    let state = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new().with(4, Behaviour::Stall));
    let orchestrator = common::orchestrator(state.path(), backend);

    let cancel = orchestrator.context().cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let mut options = common::sweep_options();
    options.manual = true;
    let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(&options))
        .await
        .expect("cancellation ends the submission phase")
        .unwrap();

    let submitted: Vec<u32> = outcome
        .report
        .entries
        .iter()
        .filter(|e| e.status == PointStatus::Submitted)
        .map(|e| e.point.processes)
        .collect();
    assert_eq!(submitted, vec![1, 2, 3]);
    assert_eq!(
        orchestrator
            .context()
            .records
            .load_jobs(&outcome.run_id)
            .unwrap()
            .len(),
        3
    );
}
