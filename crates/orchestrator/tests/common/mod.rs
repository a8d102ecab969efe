//! Shared fixtures for the orchestrator integration tests.
//!
//! [`ScriptedBackend`] stands in for a remote host: every submitted job
//! behaves according to its process count, and successful jobs leave a
//! synthetic simulator log behind.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use scalekit_core::extract::LOG_TIME_FORMAT;
use scalekit_core::grid::{GridConfig, Spacing};
use scalekit_core::host::{HostRegistry, HostSpec};
use scalekit_core::point::ParallelizationMode;
use scalekit_core::workload::{Workload, WorkloadSize};
use scalekit_orchestrator::{ExecutionContext, Orchestrator, OrchestratorConfig, SweepOptions};
use scalekit_remote::{JobScript, RemoteBackend, RemoteError, RemoteStatus};

pub const HOST_ID: &str = "cluster";

/// How a job submitted with a given process count behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Runs for one poll, then succeeds with a full log.
    Succeed,
    /// Runs for one poll, then fails without a log.
    Fail,
    /// Never finishes.
    Hang,
    /// Submission is refused.
    Reject,
    /// The submission call never returns.
    Stall,
    /// The first `n` status calls fail transiently, then the job succeeds.
    Flaky(u32),
}

#[derive(Debug)]
struct ScriptedJob {
    behaviour: Behaviour,
    polls: u32,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, ScriptedJob>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    submissions: Vec<u32>,
    deleted: Vec<PathBuf>,
}

/// In-memory [`RemoteBackend`] with scripted per-job behaviour.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    behaviours: HashMap<u32, Behaviour>,
    state: Mutex<State>,
}

impl ScriptedBackend {
    /// Every job succeeds unless overridden with [`ScriptedBackend::with`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, processes: u32, behaviour: Behaviour) -> Self {
        self.behaviours.insert(processes, behaviour);
        self
    }

    fn behaviour(&self, processes: u32) -> Behaviour {
        self.behaviours
            .get(&processes)
            .copied()
            .unwrap_or(Behaviour::Succeed)
    }

    /// Process counts in the order their submissions arrived.
    pub fn submissions(&self) -> Vec<u32> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn deleted(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }
}

#[async_trait]
impl RemoteBackend for ScriptedBackend {
    async fn submit(&self, host_id: &str, script: &JobScript) -> Result<String, RemoteError> {
        let behaviour = self.behaviour(script.processes);
        if behaviour == Behaviour::Stall {
            self.state.lock().unwrap().submissions.push(script.processes);
            return std::future::pending().await;
        }

        let mut state = self.state.lock().unwrap();
        state.submissions.push(script.processes);

        if behaviour == Behaviour::Reject {
            return Err(RemoteError::SubmissionRejected {
                host: host_id.to_string(),
                reason: "queue full".to_string(),
            });
        }

        let id = format!("job-{}-{}", state.jobs.len(), script.name);
        if matches!(behaviour, Behaviour::Succeed | Behaviour::Flaky(_)) {
            let log = skirt_log(script.processes).join("\n");
            state.files.insert(script.log_path.clone(), log.into_bytes());
        }
        state.jobs.insert(id.clone(), ScriptedJob { behaviour, polls: 0 });
        Ok(id)
    }

    async fn status(&self, host_id: &str, job_id: &str) -> Result<RemoteStatus, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(job_id).ok_or_else(|| RemoteError::NotFound {
            host: host_id.to_string(),
            path: job_id.to_string(),
        })?;
        job.polls += 1;

        let status = match job.behaviour {
            Behaviour::Hang | Behaviour::Stall => RemoteStatus::Running,
            Behaviour::Flaky(n) if job.polls <= n => {
                return Err(RemoteError::Unavailable {
                    host: host_id.to_string(),
                    reason: "connection reset".to_string(),
                })
            }
            Behaviour::Flaky(_) => RemoteStatus::Done,
            _ if job.polls == 1 => RemoteStatus::Running,
            Behaviour::Fail => RemoteStatus::Failed,
            _ => RemoteStatus::Done,
        };
        Ok(status)
    }

    async fn read_file(&self, host_id: &str, path: &Path) -> Result<Vec<u8>, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                host: host_id.to_string(),
                path: path.display().to_string(),
            })
    }

    async fn list_dir(&self, _host_id: &str, path: &Path) -> Result<Vec<String>, RemoteError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    async fn delete(&self, _host_id: &str, path: &Path) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.files.retain(|p, _| !p.starts_with(path));
        state.deleted.push(path.to_path_buf());
        Ok(())
    }
}

// -- Synthetic logs --

fn log_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap()
}

fn stamp(offset_ms: i64) -> String {
    (log_start() + TimeDelta::milliseconds(offset_ms))
        .format(LOG_TIME_FORMAT)
        .to_string()
}

/// Seconds rank `rank` of a `processes`-process run spends in stellar
/// emission: 10 s of work split evenly plus 0.5 s of fixed cost.
pub fn stellar_seconds(processes: u32) -> f64 {
    10.0 / f64::from(processes) + 0.5
}

/// Log of a SKIRT-like run with `processes` ranks.
///
/// Each rank sets up for 1 s, emits for [`stellar_seconds`], and writes
/// for 0.25 s. Per-rank memory peaks at `0.5 + 2/processes` GB.
pub fn skirt_log(processes: u32) -> Vec<String> {
    let setup_ms = 1000;
    let emission_ms = (stellar_seconds(processes) * 1000.0).round() as i64;
    let writing_ms = 250;
    let peak_gb = 0.5 + 2.0 / f64::from(processes);

    let mut lines = Vec::new();
    for rank in 0..processes {
        let tag = format!("[P{rank}]");
        let mut t = 0;
        lines.push(format!("{} {tag} Starting simulation...", stamp(t)));
        lines.push(format!("{} {tag} Starting setup...", stamp(t)));
        t += setup_ms;
        lines.push(format!("{} {tag} Finished setup.", stamp(t)));
        lines.push(format!("{} {tag} Starting stellar emission...", stamp(t)));
        lines.push(format!(
            "{} {tag} Launched stellar emission photon packages: 50.0%",
            stamp(t + emission_ms / 2)
        ));
        t += emission_ms;
        lines.push(format!(
            "{} {tag} Launched stellar emission photon packages: 100.0%",
            stamp(t)
        ));
        lines.push(format!("{} {tag} Finished stellar emission.", stamp(t)));
        lines.push(format!("{} {tag} Starting writing...", stamp(t)));
        t += writing_ms;
        lines.push(format!("{} {tag} Finished writing.", stamp(t)));
        lines.push(format!("{} {tag} Peak memory usage: {peak_gb:.3} GB", stamp(t)));
        lines.push(format!("{} {tag} Finished simulation.", stamp(t)));
    }
    lines
}

// -- Sweep fixtures --

/// Four single-core nodes.
pub fn host() -> HostSpec {
    HostSpec {
        id: HOST_ID.to_string(),
        cores_per_node: 1,
        nodes: 4,
        root: Some(PathBuf::from("/remote/scratch")),
    }
}

pub fn workload() -> Workload {
    Workload {
        name: "galaxy".to_string(),
        command: "skirt".to_string(),
        args: vec!["galaxy.ski".to_string()],
        size: WorkloadSize {
            packages: 100_000,
            wavelengths: 50,
            dust_cells: 10_000,
        },
    }
}

/// MPI sweep over 1, 2, 3, and 4 processes.
pub fn sweep_options() -> SweepOptions {
    let grid = GridConfig::new(ParallelizationMode::Mpi, 1.0, 4.0).with_spacing(Spacing::Linear);
    SweepOptions::new(workload(), HOST_ID, grid)
}

/// Fast polling and a short job timeout, with records under `state_dir`.
pub fn test_config(state_dir: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_millis(10),
        job_timeout: Duration::from_millis(400),
        max_concurrency: 4,
        poll_retries: 3,
        state_dir: state_dir.to_path_buf(),
        hosts_file: state_dir.join("hosts.json"),
    }
}

pub fn registry() -> HostRegistry {
    HostRegistry::new(vec![host()])
}

/// Orchestrator for a fresh run over `backend`.
pub fn orchestrator(state_dir: &Path, backend: Arc<ScriptedBackend>) -> Orchestrator {
    let ctx = ExecutionContext::new(registry(), test_config(state_dir));
    Orchestrator::new(ctx, backend)
}

/// Orchestrator resuming `run_id` over `backend`.
pub fn resumed(state_dir: &Path, run_id: &str, backend: Arc<ScriptedBackend>) -> Orchestrator {
    let ctx = ExecutionContext::resume(run_id, registry(), test_config(state_dir));
    Orchestrator::new(ctx, backend)
}
