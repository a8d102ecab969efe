//! End-of-sweep summary: one line per submitted (point, repeat).

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use scalekit_core::fitting::FitError;
use scalekit_core::point::ScalingPoint;

/// What became of one (point, repeat).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PointStatus {
    /// Data was extracted and added to the dataset.
    Collected,
    /// Submitted in manual mode; awaits a collection pass.
    Submitted,
    SubmissionFailed(String),
    /// The job ran but produced no usable data.
    MissingData(String),
    TimedOut,
    /// Tracking was aborted; the job record is kept for a later pass.
    Cancelled,
}

impl PointStatus {
    fn label(&self) -> String {
        match self {
            PointStatus::Collected => "collected".to_string(),
            PointStatus::Submitted => "submitted".to_string(),
            PointStatus::SubmissionFailed(reason) => format!("submission failed: {reason}"),
            PointStatus::MissingData(reason) => format!("missing data: {reason}"),
            PointStatus::TimedOut => "timed out".to_string(),
            PointStatus::Cancelled => "cancelled (record kept)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointReport {
    pub point: ScalingPoint,
    pub repeat: u32,
    pub job_id: Option<String>,
    pub status: PointStatus,
    /// Log records skipped during extraction.
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub run_id: String,
    pub host: String,
    pub manual: bool,
    pub entries: Vec<PointReport>,
    /// Series that could not be fitted, if a fit was run.
    pub skipped_fits: Vec<FitError>,
}

impl SweepReport {
    pub fn new(run_id: impl Into<String>, host: impl Into<String>, manual: bool) -> Self {
        Self {
            run_id: run_id.into(),
            host: host.into(),
            manual,
            entries: Vec::new(),
            skipped_fits: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: PointReport) {
        self.entries.push(entry);
    }

    /// Order entries by point and repeat.
    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| (a.point, a.repeat).cmp(&(b.point, b.repeat)));
    }

    fn points_where(&self, pred: impl Fn(&PointStatus) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|e| pred(&e.status))
            .map(|e| e.point)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Distinct points with at least one collected run.
    pub fn points_with_data(&self) -> usize {
        self.points_where(|s| *s == PointStatus::Collected)
    }

    pub fn total_points(&self) -> usize {
        self.points_where(|_| true)
    }

    pub fn accepted_jobs(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.job_id.is_some())
            .count()
    }

    /// Whether the run counts as successful: some point produced data,
    /// or, in manual mode, some job was accepted.
    pub fn is_success(&self) -> bool {
        if self.manual {
            self.accepted_jobs() > 0
        } else {
            self.points_with_data() > 0
        }
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.manual {
            writeln!(
                f,
                "Run {} on host \"{}\": {} job(s) submitted for {} point(s)",
                self.run_id,
                self.host,
                self.accepted_jobs(),
                self.total_points()
            )?;
        } else {
            writeln!(
                f,
                "Run {} on host \"{}\": {} of {} point(s) produced data",
                self.run_id,
                self.host,
                self.points_with_data(),
                self.total_points()
            )?;
        }

        for entry in &self.entries {
            write!(
                f,
                "  {:<20} r{:<3} {}",
                entry.point.slot_name(),
                entry.repeat,
                entry.status.label()
            )?;
            if let Some(id) = &entry.job_id {
                write!(f, " [job {id}]")?;
            }
            if entry.skipped_records > 0 {
                write!(f, " ({} log record(s) skipped)", entry.skipped_records)?;
            }
            writeln!(f)?;
        }

        if !self.skipped_fits.is_empty() {
            writeln!(f, "Skipped fits:")?;
            for skipped in &self.skipped_fits {
                writeln!(f, "  {skipped}")?;
            }
        }
        Ok(())
    }
}
