//! The execution boundary every host is driven through.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::script::JobScript;

/// Scheduler-level state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// A host capable of running job scripts.
///
/// Implementations may be an SSH connection to a cluster scheduler, a
/// container runner, or local subprocesses; callers cannot tell them
/// apart. `status`, `read_file`, and `list_dir` must not change remote
/// state.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Submit `script` and return the backend's job id. Creates the
    /// script's working directory.
    async fn submit(&self, host_id: &str, script: &JobScript) -> Result<String, RemoteError>;

    async fn status(&self, host_id: &str, job_id: &str) -> Result<RemoteStatus, RemoteError>;

    async fn read_file(&self, host_id: &str, path: &Path) -> Result<Vec<u8>, RemoteError>;

    /// Names of the entries of a directory, in no particular order.
    async fn list_dir(&self, host_id: &str, path: &Path) -> Result<Vec<String>, RemoteError>;

    /// Remove a file or a directory tree.
    async fn delete(&self, host_id: &str, path: &Path) -> Result<(), RemoteError>;
}
