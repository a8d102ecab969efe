//! Scaling grid generation.
//!
//! Node bounds are real-valued so that fractional-node configurations can
//! be expressed: `0.5` nodes on a 16-core node means 8 cores. The grid
//! walks the total core count from the lower to the upper bound and maps
//! each count onto processes and threads according to the
//! [`ParallelizationMode`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::host::HostSpec;
use crate::point::{ParallelizationMode, ScalingPoint};

/// How the total core count advances between grid points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    /// 1x, 2x, 4x, ... the minimum core count.
    Doubling,
    /// 1x, 2x, 3x, ... the minimum core count.
    Linear,
}

impl std::str::FromStr for Spacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doubling" => Ok(Spacing::Doubling),
            "linear" => Ok(Spacing::Linear),
            other => Err(format!("Unknown grid spacing \"{other}\"")),
        }
    }
}

/// Parameters of a scaling grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub mode: ParallelizationMode,
    /// Lower node bound. In hybrid mode this also fixes the number of
    /// threads per process (`min_nodes * cores_per_node`).
    pub min_nodes: f64,
    pub max_nodes: f64,
    pub spacing: Spacing,
}

impl GridConfig {
    pub fn new(mode: ParallelizationMode, min_nodes: f64, max_nodes: f64) -> Self {
        Self {
            mode,
            min_nodes,
            max_nodes,
            spacing: Spacing::Doubling,
        }
    }

    pub fn with_spacing(mut self, spacing: Spacing) -> Self {
        self.spacing = spacing;
        self
    }
}

/// Generate the ordered, duplicate-free grid for `config` on `host`.
pub fn generate(config: &GridConfig, host: &HostSpec) -> Result<Vec<ScalingPoint>, CoreError> {
    validate_bounds(config, host)?;

    let cores_per_node = host.cores_per_node;
    let mut max_cores = (config.max_nodes * f64::from(cores_per_node)).floor() as u32;
    let min_cores = ((config.min_nodes * f64::from(cores_per_node)).floor() as u32).max(1);

    if max_cores == 0 {
        return Err(CoreError::InvalidGrid(format!(
            "{} node(s) of {} cores is less than one core",
            config.max_nodes, cores_per_node
        )));
    }

    if config.mode == ParallelizationMode::Threads && max_cores > cores_per_node {
        tracing::warn!(
            requested = max_cores,
            cores_per_node,
            "Threads mode is limited to a single node, capping core count",
        );
        max_cores = cores_per_node;
    }

    if min_cores > max_cores {
        return Err(CoreError::InvalidGrid(format!(
            "Minimum of {min_cores} cores exceeds maximum of {max_cores} cores"
        )));
    }

    if config.mode == ParallelizationMode::Hybrid && min_cores > cores_per_node {
        return Err(CoreError::InvalidGrid(format!(
            "Hybrid mode requests {min_cores} threads per process but host \"{}\" \
             has {cores_per_node} cores per node",
            host.id
        )));
    }

    let mut points = Vec::new();
    for cores in core_counts(min_cores, max_cores, config.spacing) {
        let point = map_cores(config.mode, cores, min_cores, cores_per_node);
        if point.nodes > host.nodes {
            tracing::warn!(
                point = %point,
                host_nodes = host.nodes,
                "Skipping grid point that needs more nodes than the host provides",
            );
            continue;
        }
        points.push(point);
    }

    if points.is_empty() {
        return Err(CoreError::InvalidGrid(
            "Grid bounds produce no runnable configurations".to_string(),
        ));
    }

    Ok(points)
}

fn validate_bounds(config: &GridConfig, host: &HostSpec) -> Result<(), CoreError> {
    let finite = config.min_nodes.is_finite() && config.max_nodes.is_finite();
    if !finite || config.min_nodes < 0.0 || config.max_nodes <= 0.0 {
        return Err(CoreError::InvalidGrid(format!(
            "Node bounds must be non-negative and finite, got [{}, {}]",
            config.min_nodes, config.max_nodes
        )));
    }
    if config.min_nodes > config.max_nodes {
        return Err(CoreError::InvalidGrid(format!(
            "minnodes ({}) exceeds maxnodes ({})",
            config.min_nodes, config.max_nodes
        )));
    }
    if config.max_nodes > f64::from(host.nodes) {
        return Err(CoreError::InvalidGrid(format!(
            "maxnodes ({}) exceeds the {} node(s) of host \"{}\"",
            config.max_nodes, host.nodes, host.id
        )));
    }
    Ok(())
}

/// Total core counts visited by the grid, strictly increasing. The walk
/// stops at the first count that would not fit in a `u32`.
fn core_counts(min_cores: u32, max_cores: u32, spacing: Spacing) -> Vec<u32> {
    let mut counts = Vec::new();
    let mut cores = min_cores;
    let mut step = 1u32;
    while cores <= max_cores {
        counts.push(cores);
        let next = match spacing {
            Spacing::Doubling => cores.checked_mul(2),
            Spacing::Linear => {
                step += 1;
                min_cores.checked_mul(step)
            }
        };
        match next {
            Some(next) => cores = next,
            None => break,
        }
    }
    counts
}

fn map_cores(
    mode: ParallelizationMode,
    cores: u32,
    min_cores: u32,
    cores_per_node: u32,
) -> ScalingPoint {
    match mode {
        ParallelizationMode::Mpi => ScalingPoint {
            processes: cores,
            cores_per_process: 1,
            nodes: cores.div_ceil(cores_per_node),
            hybrid: false,
        },
        ParallelizationMode::Threads => ScalingPoint {
            processes: 1,
            cores_per_process: cores,
            nodes: 1,
            hybrid: false,
        },
        ParallelizationMode::Hybrid => {
            let threads = min_cores;
            let processes = cores / threads;
            let processes_per_node = (cores_per_node / threads).max(1);
            ScalingPoint {
                processes,
                cores_per_process: threads,
                nodes: processes.div_ceil(processes_per_node),
                hybrid: true,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
