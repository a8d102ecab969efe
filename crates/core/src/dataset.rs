//! The unified scaling-data table of one experiment.
//!
//! Each run (one job at one grid point and repeat index) is reduced across
//! ranks into a single value per (property, phase). The reduction operator
//! depends on the phase only and every operator in [`Reduction`] is
//! order-independent, so the aggregate is the same whatever order the
//! per-process records were read in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extract::{JobExtraction, MemoryRecord, TimingRecord};
use crate::phase::{Phase, Property};
use crate::point::ScalingPoint;
use crate::reduction::{mean_and_std, Reduction};
use crate::types::Rank;
use crate::workload::WorkloadSize;

/// One run reduced across its ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAggregate {
    /// Seconds per phase.
    pub timing: BTreeMap<Phase, f64>,
    /// Peak bytes per phase, averaged over ranks. The whole-run peak is
    /// stored under [`Phase::Total`].
    pub memory: BTreeMap<Phase, f64>,
    /// Number of distinct ranks that reported anything.
    pub ranks: u32,
    pub size: WorkloadSize,
}

impl RunAggregate {
    /// Reduce raw timing and memory records. Returns `None` when the run
    /// produced neither.
    pub fn from_records(
        timing: &[TimingRecord],
        memory: &[MemoryRecord],
        size: WorkloadSize,
    ) -> Option<Self> {
        if timing.is_empty() && memory.is_empty() {
            return None;
        }

        let mut per_phase: BTreeMap<Phase, Vec<f64>> = BTreeMap::new();
        let mut ranks: Vec<Rank> = Vec::new();
        for record in timing {
            per_phase
                .entry(record.phase)
                .or_default()
                .push(record.wall_seconds);
            ranks.push(record.process_rank);
        }
        let timing = reduce(per_phase, |phase| Property::Runtime.reduction(phase));

        // A rank may report several peaks for the same phase; it only ever
        // has one peak.
        let mut peaks: BTreeMap<(Phase, Rank), u64> = BTreeMap::new();
        for record in memory {
            let phase = record.phase.unwrap_or(Phase::Total);
            let peak = peaks.entry((phase, record.process_rank)).or_default();
            *peak = (*peak).max(record.peak_bytes);
            ranks.push(record.process_rank);
        }
        let mut per_phase: BTreeMap<Phase, Vec<f64>> = BTreeMap::new();
        for ((phase, _), bytes) in peaks {
            per_phase.entry(phase).or_default().push(bytes as f64);
        }
        let memory = reduce(per_phase, |phase| Property::Memory.reduction(phase));

        ranks.sort_unstable();
        ranks.dedup();

        Some(Self {
            timing,
            memory,
            ranks: ranks.len() as u32,
            size,
        })
    }

    pub fn from_extraction(extraction: &JobExtraction, size: WorkloadSize) -> Option<Self> {
        Self::from_records(
            &extraction.timing.records,
            &extraction.memory.records,
            size,
        )
    }

    pub fn value(&self, property: Property, phase: Phase) -> Option<f64> {
        match property {
            Property::Runtime => self.timing.get(&phase).copied(),
            Property::Memory => self.memory.get(&phase).copied(),
        }
    }
}

fn reduce(
    per_phase: BTreeMap<Phase, Vec<f64>>,
    operator: impl Fn(Phase) -> Reduction,
) -> BTreeMap<Phase, f64> {
    per_phase
        .into_iter()
        .filter_map(|(phase, values)| operator(phase).apply(&values).map(|v| (phase, v)))
        .collect()
}

/// Mean and spread of one property/phase over the repeats of a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub mean: f64,
    pub sigma: f64,
    pub count: usize,
}

/// All runs of one grid point keyed by repeat index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointData {
    pub runs: BTreeMap<u32, RunAggregate>,
}

/// Flat serialized form of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRow {
    pub point: ScalingPoint,
    pub repeat: u32,
    pub run: RunAggregate,
}

/// Experiment table mapping each [`ScalingPoint`] to its reduced runs.
///
/// Points without data are absent. Serializes as a list of
/// [`DatasetRow`]s ordered by point and repeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<DatasetRow>", into = "Vec<DatasetRow>")]
pub struct ScalingDataset {
    points: BTreeMap<ScalingPoint, PointData>,
}

impl ScalingDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a run. A run already stored for the same point and repeat is
    /// replaced and returned.
    pub fn insert(
        &mut self,
        point: ScalingPoint,
        repeat: u32,
        run: RunAggregate,
    ) -> Option<RunAggregate> {
        self.points
            .entry(point)
            .or_default()
            .runs
            .insert(repeat, run)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, point: &ScalingPoint) -> Option<&PointData> {
        self.points.get(point)
    }

    /// Points in grid order.
    pub fn points(&self) -> impl Iterator<Item = (&ScalingPoint, &PointData)> {
        self.points.iter()
    }

    /// Every phase with at least one value for `property`.
    pub fn phases(&self, property: Property) -> Vec<Phase> {
        let mut phases: Vec<Phase> = self
            .runs()
            .flat_map(|(_, _, run)| match property {
                Property::Runtime => run.timing.keys().copied().collect::<Vec<_>>(),
                Property::Memory => run.memory.keys().copied().collect::<Vec<_>>(),
            })
            .collect();
        phases.sort();
        phases.dedup();
        phases
    }

    /// Mean and standard deviation over the repeats of `point`.
    pub fn summary(
        &self,
        point: &ScalingPoint,
        property: Property,
        phase: Phase,
    ) -> Option<Measurement> {
        let values: Vec<f64> = self
            .points
            .get(point)?
            .runs
            .values()
            .filter_map(|run| run.value(property, phase))
            .collect();
        let (mean, sigma) = mean_and_std(&values)?;
        Some(Measurement {
            mean,
            sigma,
            count: values.len(),
        })
    }

    /// Distinct workload sizes across all runs.
    pub fn sizes(&self) -> Vec<WorkloadSize> {
        let mut sizes: Vec<WorkloadSize> = Vec::new();
        for (_, _, run) in self.runs() {
            if !sizes.contains(&run.size) {
                sizes.push(run.size);
            }
        }
        sizes
    }

    /// Whether the runs were made with more than one workload size.
    pub fn is_heterogeneous(&self) -> bool {
        self.sizes().len() > 1
    }

    fn runs(&self) -> impl Iterator<Item = (&ScalingPoint, u32, &RunAggregate)> {
        self.points.iter().flat_map(|(point, data)| {
            data.runs
                .iter()
                .map(move |(repeat, run)| (point, *repeat, run))
        })
    }
}

impl From<Vec<DatasetRow>> for ScalingDataset {
    fn from(rows: Vec<DatasetRow>) -> Self {
        let mut dataset = Self::new();
        for row in rows {
            dataset.insert(row.point, row.repeat, row.run);
        }
        dataset
    }
}

impl From<ScalingDataset> for Vec<DatasetRow> {
    fn from(dataset: ScalingDataset) -> Self {
        dataset
            .points
            .into_iter()
            .flat_map(|(point, data)| {
                data.runs
                    .into_iter()
                    .map(move |(repeat, run)| DatasetRow { point, repeat, run })
            })
            .collect()
    }
}
