//! Parallelization configurations: one [`ScalingPoint`] per grid entry.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How parallel resources are distributed over a scaling test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelizationMode {
    /// One single-threaded process per core.
    Mpi,
    /// A fixed number of threads per process, varying the process count.
    Hybrid,
    /// A single multi-threaded process.
    Threads,
}

impl ParallelizationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParallelizationMode::Mpi => "mpi",
            ParallelizationMode::Hybrid => "hybrid",
            ParallelizationMode::Threads => "threads",
        }
    }
}

impl fmt::Display for ParallelizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParallelizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpi" => Ok(ParallelizationMode::Mpi),
            "hybrid" => Ok(ParallelizationMode::Hybrid),
            "threads" => Ok(ParallelizationMode::Threads),
            other => Err(format!(
                "Unknown parallelization mode \"{other}\" (expected mpi, hybrid or threads)"
            )),
        }
    }
}

/// One grid entry.
///
/// `processes * cores_per_process` is the total core count of the run and
/// `nodes` is the number of nodes needed to host it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalingPoint {
    pub processes: u32,
    pub cores_per_process: u32,
    pub nodes: u32,
    pub hybrid: bool,
}

impl ScalingPoint {
    /// Saturates at `u32::MAX`; grid points never get that far.
    pub fn total_cores(&self) -> u32 {
        self.processes.saturating_mul(self.cores_per_process)
    }

    /// Directory-safe name, unique per point within a sweep.
    pub fn slot_name(&self) -> String {
        format!(
            "p{}-t{}-n{}{}",
            self.processes,
            self.cores_per_process,
            self.nodes,
            if self.hybrid { "-h" } else { "" }
        )
    }

    fn sort_key(&self) -> (u32, u32, u32, bool) {
        (self.total_cores(), self.processes, self.nodes, self.hybrid)
    }
}

impl Ord for ScalingPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ScalingPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ScalingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} process(es) x {} thread(s) on {} node(s)",
            self.processes, self.cores_per_process, self.nodes
        )
    }
}
