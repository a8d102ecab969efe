//! Scaling-test orchestration.
//!
//! An [`Orchestrator`] runs one sweep: it generates the scaling grid for
//! a host, submits one job per (point, repeat), tracks every job on a
//! fixed poll interval, extracts the finished logs, and assembles the
//! [`scalekit_core::dataset::ScalingDataset`]. Job records are persisted
//! as they are created so that a later [`Orchestrator::collect`] pass,
//! possibly from another process, can pick up where a run left off.

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod records;
pub mod report;
pub mod tracker;

pub use config::{OrchestratorConfig, SweepOptions};
pub use context::ExecutionContext;
pub use error::OrchestratorError;
pub use orchestrator::{JobExport, Orchestrator, SweepOutcome};
pub use report::{PointReport, PointStatus, SweepReport};
