use scalekit_core::error::CoreError;
use scalekit_remote::RemoteError;

/// Errors that abort a sweep or a collection pass.
///
/// Per-job and per-record problems never surface here; they are recorded
/// in the [`crate::report::SweepReport`] instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Job record store: {0}")]
    Records(String),

    #[error("No job of run {run_id} was accepted by host \"{host}\"")]
    NoJobsAccepted { run_id: String, host: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
