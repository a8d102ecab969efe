//! Domain logic for parameterised scaling experiments.
//!
//! Builds the grid of parallelization configurations, parses simulator
//! log output into structured timing, memory, progress, and timeline
//! records, reduces the per-rank records of each run into a
//! [`dataset::ScalingDataset`], and fits theoretical scaling curves to
//! the result. Nothing in this crate talks to a remote host.

pub mod dataset;
pub mod error;
pub mod extract;
pub mod fitting;
pub mod grid;
pub mod host;
pub mod phase;
pub mod point;
pub mod reduction;
pub mod types;
pub mod workload;
