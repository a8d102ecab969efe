//! Parsers that turn raw simulator log lines into structured records.
//!
//! Four independent extractors read the same log:
//!
//! - [`timing`]: per-(rank, phase) wall time from `Starting`/`Finished` markers.
//! - [`memory`]: peak memory usage lines.
//! - [`progress`]: photon package launch progress.
//! - [`timeline`]: the ordered start/end intervals of every phase per rank.
//!
//! A malformed or truncated line never aborts extraction. It is logged at
//! `warn` and returned in [`Extraction::skipped`] so that a job with
//! partially corrupted output for one process still yields records for the
//! others.

pub mod memory;
pub mod progress;
pub mod timeline;
pub mod timing;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::phase::Phase;
use crate::types::{LogTime, Rank};

pub use memory::{extract_memory, MemoryRecord};
pub use progress::{extract_progress, ProgressRecord};
pub use timeline::{extract_timeline, TimelineRecord};
pub use timing::{extract_timing, TimingRecord};

/// Timestamp layout at the start of every log line.
pub const LOG_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.3f";

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<ts>\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}\.\d{3})\s+(?:\[P(?P<rank>\d+)\]\s+)?(?P<msg>.*?)\s*$",
    )
    .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A problem with a single log record. Never fatal for a job.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum ExtractError {
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Line {line}: {phase} progress of rank {rank} out of order beyond the lookahead window")]
    Ordering { line: usize, rank: Rank, phase: Phase },

    #[error("Rank {rank} never finished phase {phase}")]
    Unfinished { rank: Rank, phase: Phase },
}

/// Records produced by one extractor together with everything it skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub skipped: Vec<ExtractError>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    pub(crate) fn skip(&mut self, extractor: &'static str, error: ExtractError) {
        tracing::warn!(extractor, error = %error, "Skipping log record");
        self.skipped.push(error);
    }
}

/// Output of all four extractors for one job log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobExtraction {
    pub timing: Extraction<TimingRecord>,
    pub memory: Extraction<MemoryRecord>,
    pub progress: Extraction<ProgressRecord>,
    pub timeline: Extraction<TimelineRecord>,
}

impl JobExtraction {
    /// Total number of records skipped across all extractors.
    pub fn skipped_count(&self) -> usize {
        self.timing.skipped.len()
            + self.memory.skipped.len()
            + self.progress.skipped.len()
            + self.timeline.skipped.len()
    }
}

/// Run every extractor over the same log snapshot.
pub fn extract_all<S: AsRef<str>>(lines: &[S]) -> JobExtraction {
    JobExtraction {
        timing: extract_timing(lines),
        memory: extract_memory(lines),
        progress: extract_progress(lines),
        timeline: extract_timeline(lines),
    }
}

// ---------------------------------------------------------------------------
// Line header
// ---------------------------------------------------------------------------

/// A log line split into its header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine<'a> {
    /// One-based line number within the log.
    pub number: usize,
    pub time: LogTime,
    pub rank: Rank,
    pub message: &'a str,
}

/// Parse the timestamp and optional `[P<rank>]` tag of a line.
pub fn parse_line(number: usize, line: &str) -> Result<LogLine<'_>, ExtractError> {
    let caps = HEADER_RE.captures(line).ok_or_else(|| ExtractError::Parse {
        line: number,
        reason: "missing or truncated timestamp header".to_string(),
    })?;

    let ts = &caps["ts"];
    let time = LogTime::parse_from_str(ts, LOG_TIME_FORMAT).map_err(|e| ExtractError::Parse {
        line: number,
        reason: format!("invalid timestamp \"{ts}\": {e}"),
    })?;

    let rank = match caps.name("rank") {
        Some(m) => m.as_str().parse::<Rank>().map_err(|e| ExtractError::Parse {
            line: number,
            reason: format!("invalid rank tag: {e}"),
        })?,
        None => 0,
    };

    let message = caps.name("msg").map_or("", |m| m.as_str());
    Ok(LogLine {
        number,
        time,
        rank,
        message,
    })
}

/// Parse the header of every line containing one of `keywords`.
///
/// Lines carrying none of the keywords belong to other extractors (or to
/// nobody) and are ignored without comment.
pub(crate) fn tagged_lines<'a, S, T>(
    lines: &'a [S],
    keywords: &[&str],
    extractor: &'static str,
    out: &mut Extraction<T>,
) -> Vec<LogLine<'a>>
where
    S: AsRef<str>,
{
    let mut tagged = Vec::new();
    for (idx, raw) in lines.iter().enumerate() {
        let raw = raw.as_ref();
        if !keywords.iter().any(|k| raw.contains(k)) {
            continue;
        }
        match parse_line(idx + 1, raw) {
            Ok(line) => tagged.push(line),
            Err(e) => out.skip(extractor, e),
        }
    }
    tagged
}

/// Seconds between two log timestamps, at millisecond resolution.
pub(crate) fn seconds_between(start: LogTime, end: LogTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
