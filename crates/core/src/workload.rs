//! Workload descriptors: what each job of a sweep runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Problem-size parameters that the fitter can extrapolate along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSize {
    /// Photon packages per wavelength.
    pub packages: u64,
    pub wavelengths: u32,
    pub dust_cells: u64,
}

/// A simulation to run at every grid point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    /// Executable invoked on the host.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub size: WorkloadSize,
}

impl Workload {
    /// Load a workload descriptor from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        let workload: Workload = serde_json::from_str(&text)?;
        workload.validate()?;
        Ok(workload)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::Configuration(
                "Workload name must not be empty".to_string(),
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(CoreError::Configuration(format!(
                "Workload name \"{}\" may only contain alphanumeric, hyphen, underscore, or dot characters",
                self.name
            )));
        }
        if self.command.is_empty() {
            return Err(CoreError::Configuration(
                "Workload command must not be empty".to_string(),
            ));
        }
        if self.size.packages == 0 || self.size.wavelengths == 0 {
            return Err(CoreError::Configuration(
                "Workload must have at least one package and one wavelength".to_string(),
            ));
        }
        Ok(())
    }

    /// Weak-scaling variant: the package count grows with `factor`.
    pub fn scaled(&self, factor: u32) -> Self {
        let mut scaled = self.clone();
        scaled.size.packages = self.size.packages * u64::from(factor.max(1));
        scaled
    }
}
