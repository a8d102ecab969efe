//! Simulation phases and the measured properties reported per phase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::reduction::Reduction;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// A named stage of simulator execution, reported independently in logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    StellarEmission,
    SpectraCalculation,
    DustEmission,
    Writing,
    Communication,
    /// Communication steps, each nested inside [`Phase::Communication`].
    DensitiesCommunication,
    StellarAbsorptionCommunication,
    DustAbsorptionCommunication,
    EmissionSpectraCommunication,
    InstrumentsCommunication,
    Waiting,
    /// Time between the other phases. Derived, never logged.
    Intermediate,
    Total,
}

impl Phase {
    pub const ALL: [Phase; 14] = [
        Phase::Setup,
        Phase::StellarEmission,
        Phase::SpectraCalculation,
        Phase::DustEmission,
        Phase::Writing,
        Phase::Communication,
        Phase::DensitiesCommunication,
        Phase::StellarAbsorptionCommunication,
        Phase::DustAbsorptionCommunication,
        Phase::EmissionSpectraCommunication,
        Phase::InstrumentsCommunication,
        Phase::Waiting,
        Phase::Intermediate,
        Phase::Total,
    ];

    /// Phases whose sum, subtracted from the total, leaves the
    /// intermediate time of a rank.
    pub const TOP_LEVEL: [Phase; 7] = [
        Phase::Setup,
        Phase::StellarEmission,
        Phase::SpectraCalculation,
        Phase::DustEmission,
        Phase::Writing,
        Phase::Communication,
        Phase::Waiting,
    ];

    /// Identifier used in serialized output and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::StellarEmission => "stellar_emission",
            Phase::SpectraCalculation => "spectra_calculation",
            Phase::DustEmission => "dust_emission",
            Phase::Writing => "writing",
            Phase::Communication => "communication",
            Phase::DensitiesCommunication => "densities_communication",
            Phase::StellarAbsorptionCommunication => "stellar_absorption_communication",
            Phase::DustAbsorptionCommunication => "dust_absorption_communication",
            Phase::EmissionSpectraCommunication => "emission_spectra_communication",
            Phase::InstrumentsCommunication => "instruments_communication",
            Phase::Waiting => "waiting",
            Phase::Intermediate => "intermediate",
            Phase::Total => "total",
        }
    }

    /// The phase name as it appears in simulator log markers.
    pub fn log_name(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::StellarEmission => "stellar emission",
            Phase::SpectraCalculation => "spectra calculation",
            Phase::DustEmission => "dust emission",
            Phase::Writing => "writing",
            Phase::Communication => "communication",
            Phase::DensitiesCommunication => "dust densities communication",
            Phase::StellarAbsorptionCommunication => "stellar absorption communication",
            Phase::DustAbsorptionCommunication => "dust absorption communication",
            Phase::EmissionSpectraCommunication => "emission spectra communication",
            Phase::InstrumentsCommunication => "instruments communication",
            Phase::Waiting => "waiting",
            Phase::Intermediate => "intermediate",
            Phase::Total => "simulation",
        }
    }

    /// Resolve a log marker phase name (case-insensitive).
    pub fn from_log_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Phase::ALL
            .into_iter()
            .filter(|p| *p != Phase::Intermediate)
            .find(|p| p.log_name() == name)
    }

    /// One of the individual steps that make up [`Phase::Communication`].
    pub fn is_communication_step(self) -> bool {
        matches!(
            self,
            Phase::DensitiesCommunication
                | Phase::StellarAbsorptionCommunication
                | Phase::DustAbsorptionCommunication
                | Phase::EmissionSpectraCommunication
                | Phase::InstrumentsCommunication
        )
    }

    /// Communication and waiting accumulate across ranks; everything else
    /// is compute-bound and reported as its critical path.
    pub fn is_overhead(self) -> bool {
        matches!(self, Phase::Communication | Phase::Waiting) || self.is_communication_step()
    }

    /// How per-rank wall times of this phase combine into one value.
    pub fn timing_reduction(self) -> Reduction {
        if self.is_overhead() {
            Reduction::Sum
        } else {
            Reduction::Max
        }
    }

    /// Whether the serial cost of this phase grows linearly with the
    /// number of photon packages.
    pub fn depends_on_packages(self) -> bool {
        matches!(self, Phase::StellarEmission | Phase::DustEmission)
    }

    /// Whether the serial cost of this phase grows linearly with the
    /// number of wavelengths.
    pub fn depends_on_wavelengths(self) -> bool {
        matches!(
            self,
            Phase::StellarEmission
                | Phase::SpectraCalculation
                | Phase::DustEmission
                | Phase::Communication
                | Phase::StellarAbsorptionCommunication
                | Phase::DustAbsorptionCommunication
                | Phase::EmissionSpectraCommunication
                | Phase::InstrumentsCommunication
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown phase: \"{s}\""))
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A measured quantity reported per phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// Wall-clock seconds.
    Runtime,
    /// Peak memory in bytes.
    Memory,
}

impl Property {
    pub fn as_str(self) -> &'static str {
        match self {
            Property::Runtime => "runtime",
            Property::Memory => "memory",
        }
    }

    /// Reduction across ranks for this property within `phase`.
    pub fn reduction(self, phase: Phase) -> Reduction {
        match self {
            Property::Runtime => phase.timing_reduction(),
            Property::Memory => Reduction::Mean,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
