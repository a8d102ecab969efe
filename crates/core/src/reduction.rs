//! Order-independent reduction of per-rank values.
//!
//! Values are sorted with [`f64::total_cmp`] before they are folded, so
//! the result is bit-identical for every permutation of the input.

use serde::{Deserialize, Serialize};

/// Reduction operator applied across ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Max,
    Mean,
}

impl Reduction {
    /// Reduce `values`. Returns `None` for an empty slice.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let result = match self {
            Reduction::Sum => sorted.iter().sum(),
            Reduction::Max => sorted[sorted.len() - 1],
            Reduction::Mean => sorted.iter().sum::<f64>() / sorted.len() as f64,
        };
        Some(result)
    }
}

/// Sample mean and standard deviation of repeated measurements.
///
/// The deviation uses Bessel's correction and is zero for a single sample.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    let mean = Reduction::Mean.apply(values)?;
    if values.len() < 2 {
        return Some((mean, 0.0));
    }
    let mut squares: Vec<f64> = values.iter().map(|v| (v - mean).powi(2)).collect();
    squares.sort_by(f64::total_cmp);
    let variance = squares.iter().sum::<f64>() / (values.len() - 1) as f64;
    Some((mean, variance.sqrt()))
}
