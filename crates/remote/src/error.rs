/// Errors from the remote execution boundary.
///
/// All of these are per-job: the orchestrator records the affected point
/// as failed and carries on with the sweep.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The host could not be reached.
    #[error("Host \"{host}\" is unavailable: {reason}")]
    Unavailable { host: String, reason: String },

    /// The host was reached but refused the job.
    #[error("Submission to host \"{host}\" rejected: {reason}")]
    SubmissionRejected { host: String, reason: String },

    #[error("{path} not found on host \"{host}\"")]
    NotFound { host: String, path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable { .. } | RemoteError::Io(_))
    }
}
