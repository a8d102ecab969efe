//! Scaling-curve fitting and extrapolation over a finished
//! [`ScalingDataset`].
//!
//! Every (property, phase) series is fitted independently: a phase with
//! too few points is reported in [`FitSet::skipped`] and the remaining
//! phases are still fitted.

pub mod extrapolation;
pub mod model;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::{RunAggregate, ScalingDataset};
use crate::error::CoreError;
use crate::phase::{Phase, Property};
use crate::point::ScalingPoint;
use crate::reduction::mean_and_std;
use crate::workload::WorkloadSize;

pub use extrapolation::{Extrapolation, MemoryExtrapolation, Reference, TimingExtrapolation};
pub use model::ModelKind;

use model::{Sample, RELATIVE_SIGMA_FLOOR};

/// Error bars of extrapolated data points relative to the fit residual.
pub const EXTRAPOLATED_SIGMA_FACTOR: f64 = 2.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why one series could not be fitted. Never fatal for the fit set.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum FitError {
    #[error("{property} of {phase}: {points} valid point(s), at least {required} needed")]
    InsufficientData {
        property: Property,
        phase: Phase,
        points: usize,
        required: usize,
    },

    #[error("{property} of {phase}: the measured points do not constrain the model")]
    Singular { property: Property, phase: Phase },
}

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Error bars are this many standard deviations of the repeats.
    pub sigma_level: f64,
    /// Use the process count instead of the core count as the abscissa
    /// for timing.
    pub hybridisation: bool,
    /// Allow runs of different workload sizes in one dataset.
    pub hetero: bool,
    /// Fit each communication step on its own next to the overall
    /// communication phase. Off, the steps are left out of the fit set.
    pub split_communication: bool,
    pub extrapolation: Extrapolation,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            sigma_level: 1.0,
            hybridisation: false,
            hetero: false,
            split_communication: false,
            extrapolation: Extrapolation::default(),
        }
    }
}

impl FitOptions {
    fn abscissa(&self, property: Property, point: &ScalingPoint) -> u32 {
        match property {
            Property::Runtime if !self.hybridisation => point.total_cores(),
            _ => point.processes,
        }
    }

    fn fits_phase(&self, phase: Phase) -> bool {
        self.split_communication || !phase.is_communication_step()
    }
}

/// A fitted model for one series. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub property: Property,
    pub phase: Phase,
    pub model: ModelKind,
    pub parameters: Vec<f64>,
    pub residual_sigma: f64,
    pub npoints: usize,
}

impl FitResult {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.model.evaluate(&self.parameters, x)
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        let idx = self.model.parameter_names().iter().position(|n| *n == name)?;
        self.parameters.get(idx).copied()
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} ({:?}):", self.property, self.phase, self.model)?;
        for (name, value) in self.model.parameter_names().iter().zip(&self.parameters) {
            write!(f, " {name}={value:.6}")?;
        }
        write!(f, " sigma={:.6} n={}", self.residual_sigma, self.npoints)
    }
}

/// One abscissa value of a normalised series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: u32,
    pub value: f64,
    pub sigma: f64,
    /// Number of measured runs behind `value`, zero when extrapolated.
    pub count: usize,
    pub extrapolated: bool,
    /// `value` relative to the total of the same configuration.
    pub fraction_of_total: Option<f64>,
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub property: Property,
    pub phase: Phase,
    pub points: Vec<SeriesPoint>,
}

/// Everything computed from one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitSet {
    pub fits: Vec<FitResult>,
    pub skipped: Vec<FitError>,
    pub series: Vec<Series>,
    pub references: BTreeMap<Property, Reference>,
}

impl FitSet {
    pub fn fit(&self, property: Property, phase: Phase) -> Option<&FitResult> {
        self.fits
            .iter()
            .find(|f| f.property == property && f.phase == phase)
    }

    pub fn series(&self, property: Property, phase: Phase) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.property == property && s.phase == phase)
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Runs of the dataset grouped by abscissa value.
struct Grouped<'a> {
    by_x: BTreeMap<u32, Vec<&'a RunAggregate>>,
}

impl<'a> Grouped<'a> {
    fn new(dataset: &'a ScalingDataset, options: &FitOptions, property: Property) -> Self {
        let mut by_x: BTreeMap<u32, Vec<&'a RunAggregate>> = BTreeMap::new();
        for (point, data) in dataset.points() {
            by_x.entry(options.abscissa(property, point))
                .or_default()
                .extend(data.runs.values());
        }
        Self { by_x }
    }

    /// Mean and standard deviation of `phase` at every x that has it.
    fn measured(&self, property: Property, phase: Phase) -> Vec<(u32, f64, f64, usize)> {
        self.by_x
            .iter()
            .filter_map(|(x, runs)| {
                let values: Vec<f64> = runs
                    .iter()
                    .filter_map(|r| r.value(property, phase))
                    .collect();
                let (mean, std) = mean_and_std(&values)?;
                Some((*x, mean, std, values.len()))
            })
            .collect()
    }

    fn size_at(&self, x: u32) -> Option<WorkloadSize> {
        self.by_x.get(&x)?.first().map(|r| r.size)
    }
}

/// Fit, normalise, and extrapolate every series of `dataset`.
///
/// Fails only on configuration errors: invalid options, or a heterogeneous
/// dataset without `hetero`.
pub fn fit_dataset(dataset: &ScalingDataset, options: &FitOptions) -> Result<FitSet, CoreError> {
    if !options.sigma_level.is_finite() || options.sigma_level <= 0.0 {
        return Err(CoreError::Configuration(format!(
            "sigma_level must be positive, got {}",
            options.sigma_level
        )));
    }
    options.extrapolation.validate(options.hetero)?;
    if dataset.is_heterogeneous() && !options.hetero {
        return Err(CoreError::Configuration(
            "Dataset mixes workload sizes; enable 'hetero' to fit it".to_string(),
        ));
    }

    let mut set = FitSet::default();
    for property in [Property::Runtime, Property::Memory] {
        fit_property(dataset, options, property, &mut set);
    }
    Ok(set)
}

fn fit_property(
    dataset: &ScalingDataset,
    options: &FitOptions,
    property: Property,
    set: &mut FitSet,
) {
    let grouped = Grouped::new(dataset, options, property);
    let phases: Vec<Phase> = dataset
        .phases(property)
        .into_iter()
        .filter(|&phase| options.fits_phase(phase))
        .collect();

    let mut fits: BTreeMap<Phase, FitResult> = BTreeMap::new();
    for &phase in &phases {
        match fit_series(&grouped, options, property, phase) {
            Ok(fit) => {
                tracing::debug!(fit = %fit, "Fitted series");
                fits.insert(phase, fit);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping fit");
                set.skipped.push(e);
            }
        }
    }

    let reference = reference_for(&grouped, options, property, &phases, &fits);

    for &phase in &phases {
        set.series
            .push(build_series(&grouped, options, property, phase, &fits, reference.as_ref()));
    }

    set.fits.extend(fits.into_values());
    if let Some(reference) = reference {
        set.references.insert(property, reference);
    }
}

fn fit_series(
    grouped: &Grouped<'_>,
    options: &FitOptions,
    property: Property,
    phase: Phase,
) -> Result<FitResult, FitError> {
    let model = ModelKind::for_series(property, phase);
    let samples: Vec<Sample> = grouped
        .measured(property, phase)
        .into_iter()
        .map(|(x, mean, std, _)| Sample {
            x: f64::from(x),
            y: mean,
            sigma: options.sigma_level * std,
        })
        .collect();

    let required = model.required_points();
    if samples.len() < required {
        return Err(FitError::InsufficientData {
            property,
            phase,
            points: samples.len(),
            required,
        });
    }

    let (parameters, residual_sigma) = model
        .solve(&samples)
        .ok_or(FitError::Singular { property, phase })?;

    Ok(FitResult {
        property,
        phase,
        model,
        parameters,
        residual_sigma,
        npoints: samples.len(),
    })
}

fn reference_for(
    grouped: &Grouped<'_>,
    options: &FitOptions,
    property: Property,
    phases: &[Phase],
    fits: &BTreeMap<Phase, FitResult>,
) -> Option<Reference> {
    let smallest = *grouped.by_x.keys().next()?;
    let size = grouped.size_at(smallest)?;

    let measured_at = |x: u32| -> BTreeMap<Phase, f64> {
        phases
            .iter()
            .filter_map(|&phase| {
                grouped
                    .measured(property, phase)
                    .into_iter()
                    .find(|m| m.0 == x)
                    .map(|m| (phase, m.1))
            })
            .collect()
    };

    if smallest == 1 || !options.extrapolation.serial(property) {
        return Some(Reference {
            x: f64::from(smallest),
            size,
            values: measured_at(smallest),
            extrapolated: false,
        });
    }

    let values: BTreeMap<Phase, f64> = fits
        .iter()
        .map(|(phase, fit)| (*phase, fit.evaluate(1.0)))
        .collect();
    if values.is_empty() {
        return Some(Reference {
            x: f64::from(smallest),
            size,
            values: measured_at(smallest),
            extrapolated: false,
        });
    }
    Some(Reference {
        x: 1.0,
        size,
        values,
        extrapolated: true,
    })
}

fn build_series(
    grouped: &Grouped<'_>,
    options: &FitOptions,
    property: Property,
    phase: Phase,
    fits: &BTreeMap<Phase, FitResult>,
    reference: Option<&Reference>,
) -> Series {
    let total_at = |x: u32, measured_total: Option<f64>| -> Option<f64> {
        fits.get(&Phase::Total)
            .map(|fit| fit.evaluate(f64::from(x)))
            .or(measured_total)
    };
    let totals: BTreeMap<u32, f64> = grouped
        .measured(property, Phase::Total)
        .into_iter()
        .map(|(x, mean, _, _)| (x, mean))
        .collect();

    let mut points: Vec<SeriesPoint> = Vec::new();

    if let (Some(reference), Some(fit)) = (reference, fits.get(&phase)) {
        if reference.extrapolated && options.extrapolation.as_data_point(property) {
            let value = fit.evaluate(1.0);
            let floor = value.abs() * RELATIVE_SIGMA_FLOOR;
            let sigma = EXTRAPOLATED_SIGMA_FACTOR * fit.residual_sigma.max(floor);
            points.push(SeriesPoint {
                x: 1,
                value,
                sigma,
                count: 0,
                extrapolated: true,
                fraction_of_total: total_at(1, None).map(|t| value / t),
                speedup: Some(1.0),
                efficiency: Some(1.0),
            });
        }
    }

    for (x, mean, std, count) in grouped.measured(property, phase) {
        let fraction_of_total = total_at(x, totals.get(&x).copied())
            .filter(|t| *t != 0.0)
            .map(|t| mean / t);

        let speedup = reference.and_then(|r| {
            let target = grouped.size_at(x)?;
            let baseline = r.baseline(&options.extrapolation, property, phase, &target)?;
            (mean > 0.0).then(|| baseline * r.x / mean)
        });
        let efficiency = speedup.map(|s| s / f64::from(x));

        points.push(SeriesPoint {
            x,
            value: mean,
            sigma: options.sigma_level * std,
            count,
            extrapolated: false,
            fraction_of_total,
            speedup,
            efficiency,
        });
    }

    Series {
        property,
        phase,
        points,
    }
}
