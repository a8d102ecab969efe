use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scalekit_core::error::CoreError;
use scalekit_core::grid::GridConfig;
use scalekit_core::workload::Workload;
use scalekit_remote::BackoffConfig;

/// Orchestrator tunables loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Interval between two status polls of one job.
    pub poll_interval: Duration,
    /// Wall-clock budget per job, measured from submission.
    pub job_timeout: Duration,
    /// Bound on concurrent remote calls.
    pub max_concurrency: usize,
    /// Consecutive failed polls or log fetches before a job is abandoned.
    pub poll_retries: u32,
    pub state_dir: PathBuf,
    pub hosts_file: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            job_timeout: Duration::from_secs(86_400),
            max_concurrency: 8,
            poll_retries: 5,
            state_dir: PathBuf::from("./scalekit-state"),
            hosts_file: PathBuf::from("hosts.json"),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default            |
    /// |-----------------------------|--------------------|
    /// | `SCALEKIT_POLL_INTERVAL_MS` | `5000`             |
    /// | `SCALEKIT_JOB_TIMEOUT_SECS` | `86400`            |
    /// | `SCALEKIT_MAX_CONCURRENCY`  | `8`                |
    /// | `SCALEKIT_POLL_RETRIES`     | `5`                |
    /// | `SCALEKIT_STATE_DIR`        | `./scalekit-state` |
    /// | `SCALEKIT_HOSTS_FILE`       | `hosts.json`       |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let poll_interval_ms: u64 = env_or("SCALEKIT_POLL_INTERVAL_MS", 5000)?;
        let job_timeout_secs: u64 = env_or("SCALEKIT_JOB_TIMEOUT_SECS", 86_400)?;
        let max_concurrency: usize = env_or("SCALEKIT_MAX_CONCURRENCY", defaults.max_concurrency)?;
        let poll_retries: u32 = env_or("SCALEKIT_POLL_RETRIES", defaults.poll_retries)?;

        if poll_interval_ms == 0 || max_concurrency == 0 {
            return Err(CoreError::Configuration(
                "SCALEKIT_POLL_INTERVAL_MS and SCALEKIT_MAX_CONCURRENCY must be positive"
                    .to_string(),
            ));
        }

        let state_dir = std::env::var("SCALEKIT_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);
        let hosts_file = std::env::var("SCALEKIT_HOSTS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.hosts_file);

        Ok(Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            job_timeout: Duration::from_secs(job_timeout_secs),
            max_concurrency,
            poll_retries,
            state_dir,
            hosts_file,
        })
    }

    /// Retry policy for polls and log fetches.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.poll_interval,
            max_delay: self.poll_interval * 8,
            multiplier: 2.0,
            max_retries: self.poll_retries,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, CoreError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoreError::Configuration(format!("{name} must be a valid number: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Everything needed to run, or later resume, one sweep.
///
/// Persisted next to the job records so that a collection pass can
/// rebuild the same context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOptions {
    pub workload: Workload,
    pub host: String,
    pub grid: GridConfig,
    /// Submissions per grid point.
    pub repeats: u32,
    /// Submit and exit; collect later.
    pub manual: bool,
    /// Leave job output on the host after extraction.
    pub keep_output: bool,
    pub progress: bool,
    pub timeline: bool,
    /// Grow the package count with the core count.
    pub weak: bool,
}

impl SweepOptions {
    pub fn new(workload: Workload, host: impl Into<String>, grid: GridConfig) -> Self {
        Self {
            workload,
            host: host.into(),
            grid,
            repeats: 1,
            manual: false,
            keep_output: false,
            progress: false,
            timeline: false,
            weak: false,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.workload.validate()?;
        if self.repeats == 0 {
            return Err(CoreError::Configuration(
                "At least one repeat per point is required".to_string(),
            ));
        }
        Ok(())
    }
}
