//! Theoretical scaling models and the weighted least-squares solver.

use faer::linalg::solvers::SolveLstsq;
use faer::Mat;
use serde::{Deserialize, Serialize};

use crate::phase::{Phase, Property};

/// Uncertainty assigned to a point without repeats, relative to its value.
pub(crate) const RELATIVE_SIGMA_FLOOR: f64 = 0.01;

/// Diagonal entries of `R` below this fraction of the largest one mark a
/// rank-deficient design.
const RANK_TOLERANCE: f64 = 1e-10;

/// Minimum number of points for any fit.
pub const MIN_POINTS: usize = 3;

/// Functional form fitted to one series. `x` is the core or process count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// `serial / x + overhead`
    Amdahl,
    /// `serial / x + overhead + communication * x`
    AmdahlCommunication,
    /// `base + per_process / x`
    MemoryScaling,
}

impl ModelKind {
    /// Model used for `phase` of `property`.
    pub fn for_series(property: Property, phase: Phase) -> Self {
        match property {
            Property::Memory => ModelKind::MemoryScaling,
            Property::Runtime if phase.is_overhead() => ModelKind::AmdahlCommunication,
            Property::Runtime => ModelKind::Amdahl,
        }
    }

    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Amdahl => &["serial", "overhead"],
            ModelKind::AmdahlCommunication => &["serial", "overhead", "communication"],
            ModelKind::MemoryScaling => &["base", "per_process"],
        }
    }

    pub fn parameter_count(self) -> usize {
        self.parameter_names().len()
    }

    /// Points needed before the model is fitted at all.
    pub fn required_points(self) -> usize {
        MIN_POINTS.max(self.parameter_count())
    }

    fn basis(self, x: f64) -> Vec<f64> {
        match self {
            ModelKind::Amdahl => vec![1.0 / x, 1.0],
            ModelKind::AmdahlCommunication => vec![1.0 / x, 1.0, x],
            ModelKind::MemoryScaling => vec![1.0, 1.0 / x],
        }
    }

    pub fn evaluate(self, parameters: &[f64], x: f64) -> f64 {
        self.basis(x)
            .iter()
            .zip(parameters)
            .map(|(b, p)| b * p)
            .sum()
    }

    /// Weighted linear least squares over `samples`.
    ///
    /// Rows of the design matrix are scaled by `1 / sigma` and the system is
    /// solved through a QR factorization of the scaled design. Returns the
    /// parameters and the residual standard deviation, or `None` when the
    /// design is rank deficient.
    pub(crate) fn solve(self, samples: &[Sample]) -> Option<(Vec<f64>, f64)> {
        let k = self.parameter_count();
        let n = samples.len();
        if n < k {
            return None;
        }
        // Row weights relative to the most precise sample keep the scaled
        // system finite when every value sits at the sigma floor.
        let sigmas: Vec<f64> = samples.iter().map(Sample::effective_sigma).collect();
        let precise = sigmas.iter().fold(f64::INFINITY, |m, s| m.min(*s));
        let weights: Vec<f64> = sigmas.iter().map(|s| precise / s).collect();
        let bases: Vec<Vec<f64>> = samples.iter().map(|s| self.basis(s.x)).collect();
        let design = Mat::from_fn(n, k, |i, j| bases[i][j] * weights[i]);
        let observed = Mat::from_fn(n, 1, |i, _| samples[i].y * weights[i]);

        let qr = design.qr();
        let r = qr.R();
        let diagonal: Vec<f64> = (0..k).map(|i| r[(i, i)].abs()).collect();
        let scale = diagonal.iter().fold(0.0_f64, |m, v| m.max(*v));
        if scale == 0.0 || !scale.is_finite() {
            return None;
        }
        if diagonal.iter().any(|d| *d <= scale * RANK_TOLERANCE) {
            return None;
        }

        let solution = qr.solve_lstsq(observed.as_ref());
        let parameters: Vec<f64> = (0..k).map(|i| solution[(i, 0)]).collect();
        if parameters.iter().any(|p| !p.is_finite()) {
            return None;
        }

        let residual_sigma = if n > k {
            let squares: f64 = samples
                .iter()
                .map(|s| (s.y - self.evaluate(&parameters, s.x)).powi(2))
                .sum();
            (squares / (n - k) as f64).sqrt()
        } else {
            0.0
        };
        Some((parameters, residual_sigma))
    }
}

/// One measured point of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Sample {
    pub x: f64,
    pub y: f64,
    /// Error bar at the requested sigma level. Zero without repeats.
    pub sigma: f64,
}

impl Sample {
    pub fn effective_sigma(&self) -> f64 {
        let floor = (self.y.abs() * RELATIVE_SIGMA_FLOOR).max(f64::MIN_POSITIVE.sqrt());
        self.sigma.max(floor)
    }
}
