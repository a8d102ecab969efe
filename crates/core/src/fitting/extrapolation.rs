//! Serial baselines and workload-size extrapolation.
//!
//! Speedups are measured against a reference run: the measured serial
//! point when there is one, otherwise the fitted model evaluated at one
//! core (when requested), otherwise the smallest measured configuration.
//! For heterogeneous datasets the reference can be scaled to the workload
//! of every other point along the package, wavelength, and dust-cell axes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::phase::{Phase, Property};
use crate::workload::WorkloadSize;

/// Timing extrapolation switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingExtrapolation {
    /// Extrapolate to a single core to obtain a serial time.
    pub ncores: bool,
    /// Scale the serial run to the package count of every point.
    pub npackages: bool,
    /// Scale the serial run to the wavelength count of every point.
    pub nwavelengths: bool,
    /// Show the extrapolated serial time as a data point.
    pub in_times: bool,
}

/// Memory extrapolation switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryExtrapolation {
    /// Extrapolate to a single process to obtain serial memory usage.
    pub nprocesses: bool,
    pub nwavelengths: bool,
    pub ncells: bool,
    /// Show the extrapolated serial memory as a data point.
    pub in_memory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extrapolation {
    pub timing: TimingExtrapolation,
    pub memory: MemoryExtrapolation,
}

impl Extrapolation {
    /// Whether any workload axis is extrapolated along.
    pub fn requires_hetero(&self) -> bool {
        self.timing.npackages
            || self.timing.nwavelengths
            || self.memory.nwavelengths
            || self.memory.ncells
    }

    pub fn serial(&self, property: Property) -> bool {
        match property {
            Property::Runtime => self.timing.ncores,
            Property::Memory => self.memory.nprocesses,
        }
    }

    pub fn as_data_point(&self, property: Property) -> bool {
        match property {
            Property::Runtime => self.timing.in_times,
            Property::Memory => self.memory.in_memory,
        }
    }

    /// Reject flag combinations that cannot be honoured.
    pub fn validate(&self, hetero: bool) -> Result<(), CoreError> {
        if self.requires_hetero() && !hetero {
            return Err(CoreError::Configuration(
                "Package, wavelength, or dust cell extrapolation requires 'hetero' to be enabled"
                    .to_string(),
            ));
        }
        if self.timing.in_times && !self.timing.ncores {
            return Err(CoreError::Configuration(
                "'in_times' requires timing extrapolation to one core ('ncores')".to_string(),
            ));
        }
        if self.memory.in_memory && !self.memory.nprocesses {
            return Err(CoreError::Configuration(
                "'in_memory' requires memory extrapolation to one process ('nprocesses')"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Linear scale factor taking `phase` from the `reference` workload to
    /// `target`.
    pub fn workload_factor(
        &self,
        property: Property,
        phase: Phase,
        reference: &WorkloadSize,
        target: &WorkloadSize,
    ) -> f64 {
        let packages = ratio(target.packages as f64, reference.packages as f64);
        let wavelengths = ratio(f64::from(target.wavelengths), f64::from(reference.wavelengths));
        let cells = ratio(target.dust_cells as f64, reference.dust_cells as f64);

        let mut factor = 1.0;
        match property {
            Property::Runtime => {
                if self.timing.npackages && phase.depends_on_packages() {
                    factor *= packages;
                }
                if self.timing.nwavelengths && phase.depends_on_wavelengths() {
                    factor *= wavelengths;
                }
            }
            Property::Memory => {
                if self.memory.nwavelengths {
                    factor *= wavelengths;
                }
                if self.memory.ncells {
                    factor *= cells;
                }
            }
        }
        factor
    }
}

fn ratio(target: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        target / reference
    } else {
        1.0
    }
}

/// The run speedups are measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Core or process count of the reference.
    pub x: f64,
    pub size: WorkloadSize,
    pub values: BTreeMap<Phase, f64>,
    /// The values come from fitted models rather than a measurement.
    pub extrapolated: bool,
}

impl Reference {
    /// Reference value of `phase` scaled to the `target` workload.
    ///
    /// Runtime totals are rebuilt as the reference total plus the change
    /// of every scaled phase, so that unscaled phases keep their weight.
    pub fn baseline(
        &self,
        extrapolation: &Extrapolation,
        property: Property,
        phase: Phase,
        target: &WorkloadSize,
    ) -> Option<f64> {
        let value = *self.values.get(&phase)?;
        if property == Property::Runtime && phase == Phase::Total {
            let delta: f64 = self
                .values
                .iter()
                // Communication steps are already part of the communication phase.
                .filter(|(p, _)| **p != Phase::Total && !p.is_communication_step())
                .map(|(p, v)| {
                    v * (extrapolation.workload_factor(property, *p, &self.size, target) - 1.0)
                })
                .sum();
            return Some(value + delta);
        }
        Some(value * extrapolation.workload_factor(property, phase, &self.size, target))
    }
}
