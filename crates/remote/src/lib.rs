//! Remote execution for scaling jobs.
//!
//! [`RemoteBackend`] is the narrow RPC-like surface a host is driven
//! through (submit a script, query status, read, list, and delete files).
//! [`JobHandle`] builds on it to submit one job per grid point, poll it,
//! fetch its log, and remove its working directory. [`LocalBackend`] runs
//! jobs as subprocesses of the current machine.

pub mod backend;
pub mod backoff;
pub mod error;
pub mod handle;
pub mod job;
pub mod local;
pub mod script;

pub use backend::{RemoteBackend, RemoteStatus};
pub use backoff::{Backoff, BackoffConfig};
pub use error::RemoteError;
pub use handle::JobHandle;
pub use job::{Job, JobState};
pub use local::LocalBackend;
pub use script::JobScript;
