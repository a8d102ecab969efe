//! Persisted job records.
//!
//! Layout under the state directory:
//!
//! ```text
//! <run_id>/sweep.json                       sweep options
//! <run_id>/<host>/<job>.json                jobs still to be collected
//! <run_id>/<host>/archive/<job>.json        collected or abandoned jobs
//! ```
//!
//! Every file is written to a temporary name first and renamed into
//! place, so a record is either absent or complete after a crash.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use scalekit_core::dataset::RunAggregate;
use scalekit_remote::Job;

use crate::config::SweepOptions;
use crate::error::OrchestratorError;

const SWEEP_FILE: &str = "sweep.json";
const ARCHIVE_DIR: &str = "archive";

/// A job that needs no further tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedJob {
    pub job: Job,
    /// The reduced run, if the job produced data.
    pub run: Option<RunAggregate>,
}

/// File-backed store of job records, one directory per run.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    pub fn save_sweep(
        &self,
        run_id: &str,
        options: &SweepOptions,
    ) -> Result<(), OrchestratorError> {
        write_json(&self.run_dir(run_id).join(SWEEP_FILE), options)
    }

    pub fn load_sweep(&self, run_id: &str) -> Result<SweepOptions, OrchestratorError> {
        let path = self.run_dir(run_id).join(SWEEP_FILE);
        if !path.exists() {
            return Err(OrchestratorError::Records(format!(
                "no sweep recorded for run {run_id} under {}",
                self.root.display()
            )));
        }
        read_json(&path)
    }

    /// Create or overwrite the active record of `job`.
    pub fn save_job(&self, run_id: &str, job: &Job) -> Result<(), OrchestratorError> {
        write_json(&self.job_path(run_id, job), job)
    }

    /// Move the record of `job` into the archive.
    pub fn archive_job(
        &self,
        run_id: &str,
        job: &Job,
        run: Option<&RunAggregate>,
    ) -> Result<(), OrchestratorError> {
        let archived = ArchivedJob {
            job: job.clone(),
            run: run.cloned(),
        };
        let active = self.job_path(run_id, job);
        let target = self
            .host_dir(run_id, &job.host)
            .join(ARCHIVE_DIR)
            .join(record_file_name(&job.id));
        write_json(&target, &archived)?;
        if active.exists() {
            fs::remove_file(&active)?;
        }
        Ok(())
    }

    /// Jobs of `run_id` still awaiting collection, ordered by point and
    /// repeat.
    pub fn load_jobs(&self, run_id: &str) -> Result<Vec<Job>, OrchestratorError> {
        let mut jobs: Vec<Job> = Vec::new();
        for host_dir in self.host_dirs(run_id)? {
            jobs.extend(read_records::<Job>(&host_dir)?);
        }
        jobs.sort_by(|a, b| (a.point, a.repeat).cmp(&(b.point, b.repeat)));
        Ok(jobs)
    }

    pub fn load_archived(&self, run_id: &str) -> Result<Vec<ArchivedJob>, OrchestratorError> {
        let mut archived: Vec<ArchivedJob> = Vec::new();
        for host_dir in self.host_dirs(run_id)? {
            let dir = host_dir.join(ARCHIVE_DIR);
            if dir.is_dir() {
                archived.extend(read_records::<ArchivedJob>(&dir)?);
            }
        }
        archived.sort_by(|a, b| (a.job.point, a.job.repeat).cmp(&(b.job.point, b.job.repeat)));
        Ok(archived)
    }

    fn host_dir(&self, run_id: &str, host: &str) -> PathBuf {
        self.run_dir(run_id).join(host)
    }

    fn job_path(&self, run_id: &str, job: &Job) -> PathBuf {
        self.host_dir(run_id, &job.host).join(record_file_name(&job.id))
    }

    fn host_dirs(&self, run_id: &str) -> Result<Vec<PathBuf>, OrchestratorError> {
        let run_dir = self.run_dir(run_id);
        if !run_dir.is_dir() {
            return Err(OrchestratorError::Records(format!(
                "unknown run {run_id} under {}",
                self.root.display()
            )));
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&run_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// File name for a backend job id. Ids may contain path separators.
fn record_file_name(job_id: &str) -> String {
    let safe: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", safe.trim_start_matches('.'))
}

fn read_records<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, OrchestratorError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            records.push(read_json(&path)?);
        }
    }
    Ok(records)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, OrchestratorError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| OrchestratorError::Records(format!("{}: {e}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OrchestratorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_become_flat_file_names() {
        assert_eq!(record_file_name("12345.cluster"), "12345.cluster.json");
        assert_eq!(record_file_name("/tmp/run/job-r0"), "_tmp_run_job-r0.json");
        assert_eq!(record_file_name(".hidden"), "hidden.json");
    }
}
