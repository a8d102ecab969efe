//! Files written at the end of a sweep.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use scalekit_core::dataset::ScalingDataset;
use scalekit_core::fitting::FitSet;

use crate::error::OrchestratorError;
use crate::orchestrator::SweepOutcome;

pub const DATASET_FILE: &str = "dataset.json";
pub const FITS_FILE: &str = "fits.json";
pub const REPORT_FILE: &str = "report.txt";

/// Write the dataset, the fits, the report, and any progress or
/// timeline exports under `dir`. Returns the paths written.
pub fn write_outcome(
    dir: &Path,
    outcome: &SweepOutcome,
    fits: Option<&FitSet>,
) -> Result<Vec<PathBuf>, OrchestratorError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if !outcome.report.manual {
        written.push(write_json(&dir.join(DATASET_FILE), &outcome.dataset)?);
    }
    if let Some(fits) = fits {
        written.push(write_json(&dir.join(FITS_FILE), fits)?);
    }

    let mut report = outcome.report.to_string();
    if let Some(fits) = fits {
        if !fits.fits.is_empty() {
            report.push_str("Fits:\n");
            for fit in &fits.fits {
                report.push_str(&format!("  {fit}\n"));
            }
        }
    }
    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, report)?;
    written.push(report_path);

    for export in &outcome.exports {
        if let Some(progress) = &export.progress {
            let path = dir.join("progress").join(format!("{}.json", export.name));
            written.push(write_json(&path, progress)?);
        }
        if let Some(timeline) = &export.timeline {
            let path = dir.join("timeline").join(format!("{}.json", export.name));
            written.push(write_json(&path, timeline)?);
        }
    }

    tracing::info!(dir = %dir.display(), files = written.len(), "Wrote sweep output");
    Ok(written)
}

pub fn read_dataset(path: &Path) -> Result<ScalingDataset, OrchestratorError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf, OrchestratorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(path.to_path_buf())
}
