//! Submit, poll, and clean up jobs through a [`RemoteBackend`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use scalekit_core::host::HostSpec;
use scalekit_core::point::ScalingPoint;
use scalekit_core::workload::Workload;

use crate::backend::RemoteBackend;
use crate::error::RemoteError;
use crate::job::{Job, JobState};
use crate::script::JobScript;

/// Root for hosts that declare none.
fn default_root() -> PathBuf {
    std::env::temp_dir().join("scalekit")
}

/// Working directory of one job.
///
/// Derived from the run, the point, and the repeat index only, so two jobs
/// of the same sweep never share a directory.
pub fn job_dir(
    host: &HostSpec,
    run_id: &str,
    workload: &str,
    point: &ScalingPoint,
    repeat: u32,
) -> PathBuf {
    host.root
        .clone()
        .unwrap_or_else(default_root)
        .join(run_id)
        .join(job_name(workload, point, repeat))
}

pub fn job_name(workload: &str, point: &ScalingPoint, repeat: u32) -> String {
    format!("{workload}-{}-r{repeat}", point.slot_name())
}

/// Cheap to clone; all clones share the backend.
#[derive(Clone)]
pub struct JobHandle {
    backend: Arc<dyn RemoteBackend>,
}

impl JobHandle {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }

    /// Submit `workload` at `point` on `host`.
    ///
    /// Submission errors are returned as-is and never retried here.
    pub async fn submit(
        &self,
        host: &HostSpec,
        run_id: &str,
        point: &ScalingPoint,
        repeat: u32,
        workload: &Workload,
    ) -> Result<Job, RemoteError> {
        let name = job_name(&workload.name, point, repeat);
        let dir = job_dir(host, run_id, &workload.name, point, repeat);
        let script = JobScript::for_point(workload, point, &name, &dir);

        let id = self.backend.submit(&host.id, &script).await?;
        tracing::info!(job_id = %id, host = %host.id, point = %point, repeat, "Submitted job");

        Ok(Job {
            id,
            host: host.id.clone(),
            point: *point,
            repeat,
            size: workload.size,
            submit_time: Utc::now(),
            state: JobState::Pending,
            working_dir: dir,
            log_path: script.log_path,
        })
    }

    /// Current state of `job`. Does not modify the job or the host.
    pub async fn poll(&self, job: &Job) -> Result<JobState, RemoteError> {
        let status = self.backend.status(&job.host, &job.id).await?;
        Ok(JobState::from(status))
    }

    /// All log lines of `job`.
    ///
    /// Multi-process runs may write one log file per rank next to the main
    /// log (`<stem>P1.txt`, ...); those are appended after the main log.
    pub async fn fetch_log(&self, job: &Job) -> Result<Vec<String>, RemoteError> {
        let stem = job
            .log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let main_name = job
            .log_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut extra: Vec<String> = self
            .backend
            .list_dir(&job.host, &job.working_dir)
            .await?
            .into_iter()
            .filter(|n| {
                *n != main_name && n.starts_with(&format!("{stem}P")) && n.ends_with(".txt")
            })
            .collect();
        extra.sort();

        let mut lines = read_lines(self.backend.as_ref(), &job.host, &job.log_path).await?;
        for name in extra {
            let path = job.working_dir.join(&name);
            lines.extend(read_lines(self.backend.as_ref(), &job.host, &path).await?);
        }
        tracing::debug!(job_id = %job.id, lines = lines.len(), "Fetched job log");
        Ok(lines)
    }

    /// Remove the working directory of `job`.
    pub async fn cleanup(&self, job: &Job) -> Result<(), RemoteError> {
        self.backend.delete(&job.host, &job.working_dir).await?;
        tracing::info!(job_id = %job.id, dir = %job.working_dir.display(), "Removed job output");
        Ok(())
    }
}

async fn read_lines(
    backend: &dyn RemoteBackend,
    host: &str,
    path: &Path,
) -> Result<Vec<String>, RemoteError> {
    let bytes = backend.read_file(host, path).await?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}
