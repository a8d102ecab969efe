#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use scalekit_core::host::HostSpec;
use scalekit_core::point::ScalingPoint;
use scalekit_core::workload::{Workload, WorkloadSize};
use scalekit_remote::{Job, JobHandle, JobState, LocalBackend, RemoteBackend, RemoteError};

fn host(root: &std::path::Path) -> HostSpec {
    HostSpec {
        id: "local".to_string(),
        cores_per_node: 4,
        nodes: 1,
        root: Some(root.to_path_buf()),
    }
}

fn point() -> ScalingPoint {
    ScalingPoint {
        processes: 1,
        cores_per_process: 2,
        nodes: 1,
        hybrid: false,
    }
}

fn workload(command: &str, args: &[&str]) -> Workload {
    Workload {
        name: "spiral".to_string(),
        command: command.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        size: WorkloadSize {
            packages: 100,
            wavelengths: 5,
            dust_cells: 10,
        },
    }
}

async fn wait_for_terminal(handle: &JobHandle, job: &Job) -> JobState {
    for _ in 0..200 {
        let state = handle.poll(job).await.unwrap();
        if state.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish", job.id);
}

#[tokio::test]
async fn job_runs_and_log_is_fetched() {
    let root = tempfile::tempdir().unwrap();
    let handle = JobHandle::new(Arc::new(LocalBackend::new()));
    let workload = workload(
        "printf",
        &[
            "%s\\n",
            "01/01/2017 10:00:00.000 Starting setup...",
            "01/01/2017 10:00:01.500 Finished setup.",
        ],
    );

    let job = handle
        .submit(&host(root.path()), "run-1", &point(), 0, &workload)
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.working_dir.ends_with("run-1/spiral-p1-t2-n1-r0"));

    assert_eq!(wait_for_terminal(&handle, &job).await, JobState::Succeeded);

    let lines = handle.fetch_log(&job).await.unwrap();
    assert_eq!(
        lines,
        vec![
            "01/01/2017 10:00:00.000 Starting setup...",
            "01/01/2017 10:00:01.500 Finished setup.",
        ]
    );

    handle.cleanup(&job).await.unwrap();
    assert!(!job.working_dir.exists());
}

#[tokio::test]
async fn non_zero_exit_is_failed() {
    let root = tempfile::tempdir().unwrap();
    let handle = JobHandle::new(Arc::new(LocalBackend::new()));
    let job = handle
        .submit(&host(root.path()), "run-2", &point(), 0, &workload("false", &[]))
        .await
        .unwrap();
    assert_eq!(wait_for_terminal(&handle, &job).await, JobState::Failed);
}

#[tokio::test]
async fn occupied_slot_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let handle = JobHandle::new(Arc::new(LocalBackend::new()));
    let host = host(root.path());
    let workload = workload("true", &[]);

    handle.submit(&host, "run-3", &point(), 0, &workload).await.unwrap();
    let second = handle.submit(&host, "run-3", &point(), 0, &workload).await;
    assert_matches!(second, Err(RemoteError::SubmissionRejected { .. }));

    // A different repeat gets its own directory.
    assert!(handle.submit(&host, "run-3", &point(), 1, &workload).await.is_ok());
}

#[tokio::test]
async fn missing_paths_are_not_found() {
    let root = tempfile::tempdir().unwrap();
    let backend = LocalBackend::new();
    let missing = root.path().join("nope");

    assert_matches!(
        backend.read_file("local", &missing).await,
        Err(RemoteError::NotFound { .. })
    );
    assert_matches!(
        backend.status("local", &missing.display().to_string()).await,
        Err(RemoteError::NotFound { .. })
    );
    assert_matches!(
        backend.delete("local", &missing).await,
        Err(RemoteError::NotFound { .. })
    );
}

#[tokio::test]
async fn per_rank_logs_are_appended() {
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(LocalBackend::new());
    let handle = JobHandle::new(backend.clone());
    let job = handle
        .submit(
            &host(root.path()),
            "run-4",
            &point(),
            0,
            &workload("printf", &["%s\\n", "01/01/2017 10:00:00.000 [P0] Starting setup..."]),
        )
        .await
        .unwrap();
    assert_eq!(wait_for_terminal(&handle, &job).await, JobState::Succeeded);

    std::fs::write(
        job.working_dir.join("spiral_logP1.txt"),
        "01/01/2017 10:00:00.000 [P1] Starting setup...\n",
    )
    .unwrap();

    let lines = handle.fetch_log(&job).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("[P1]"));
}
