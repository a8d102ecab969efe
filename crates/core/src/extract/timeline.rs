//! Ordered phase intervals per rank, relative to the start of the log.

use serde::{Deserialize, Serialize};

use super::timing::pair_markers;
use super::{seconds_between, ExtractError, Extraction};
use crate::phase::Phase;
use crate::types::Rank;

const EXTRACTOR: &str = "timeline";

/// One phase interval on one rank. `start` and `end` are seconds since the
/// earliest completed interval in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRecord {
    pub phase: Phase,
    pub process_rank: Rank,
    pub start: f64,
    pub end: f64,
}

/// Extract every start/finish interval, ordered by rank and start time.
///
/// [`Phase::Total`] is left out since it spans the whole run.
pub fn extract_timeline<S: AsRef<str>>(lines: &[S]) -> Extraction<TimelineRecord> {
    let mut out = Extraction::default();
    let (intervals, unfinished) = pair_markers(lines, EXTRACTOR, &mut out);

    for (rank, phase) in unfinished {
        out.skip(EXTRACTOR, ExtractError::Unfinished { rank, phase });
    }

    let Some(origin) = intervals.iter().map(|i| i.start).min() else {
        return out;
    };

    let mut records: Vec<TimelineRecord> = intervals
        .into_iter()
        .filter(|i| i.phase != Phase::Total)
        .map(|i| TimelineRecord {
            phase: i.phase,
            process_rank: i.rank,
            start: seconds_between(origin, i.start),
            end: seconds_between(origin, i.end),
        })
        .collect();
    records.sort_by(|a, b| {
        a.process_rank
            .cmp(&b.process_rank)
            .then(a.start.total_cmp(&b.start))
            .then(a.phase.cmp(&b.phase))
    });

    out.records = records;
    out
}
