//! Phase wall times from `Starting <phase>...` / `Finished <phase>.` pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{seconds_between, tagged_lines, ExtractError, Extraction, LogLine};
use crate::phase::Phase;
use crate::types::{LogTime, Rank};

const EXTRACTOR: &str = "timing";

pub(crate) const MARKER_KEYWORDS: [&str; 2] = ["Starting ", "Finished "];

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>Starting|Finished) (?P<name>.+?)(?:\.\.\.|\.)?$").expect("valid regex")
});

/// Wall time one rank spent in one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub phase: Phase,
    pub process_rank: Rank,
    pub wall_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    Start,
    Finish,
}

/// A recognised phase boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Marker {
    pub line: usize,
    pub time: LogTime,
    pub rank: Rank,
    pub phase: Phase,
    pub kind: MarkerKind,
}

/// Recognise a phase marker. Markers naming a phase we do not track
/// return `None`.
pub(crate) fn parse_marker(line: &LogLine<'_>) -> Option<Marker> {
    let caps = MARKER_RE.captures(line.message)?;
    let phase = Phase::from_log_name(&caps["name"])?;
    let kind = if &caps["kind"] == "Starting" {
        MarkerKind::Start
    } else {
        MarkerKind::Finish
    };
    Some(Marker {
        line: line.number,
        time: line.time,
        rank: line.rank,
        phase,
        kind,
    })
}

/// A completed start/finish interval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Interval {
    pub rank: Rank,
    pub phase: Phase,
    pub start: LogTime,
    pub end: LogTime,
}

/// Pair markers per (rank, phase).
///
/// Returns every completed interval in finish order plus the set of
/// (rank, phase) keys left open at the end of the log. Problems are
/// recorded on `out`.
pub(crate) fn pair_markers<S: AsRef<str>, T>(
    lines: &[S],
    extractor: &'static str,
    out: &mut Extraction<T>,
) -> (Vec<Interval>, BTreeSet<(Rank, Phase)>) {
    let mut open: BTreeMap<(Rank, Phase), Marker> = BTreeMap::new();
    let mut intervals = Vec::new();

    for line in tagged_lines(lines, &MARKER_KEYWORDS, extractor, out) {
        let Some(marker) = parse_marker(&line) else {
            continue;
        };
        let key = (marker.rank, marker.phase);

        match marker.kind {
            MarkerKind::Start => {
                if let Some(previous) = open.insert(key, marker) {
                    out.skip(
                        extractor,
                        ExtractError::Parse {
                            line: previous.line,
                            reason: format!(
                                "phase {} of rank {} restarted before it finished",
                                marker.phase, marker.rank
                            ),
                        },
                    );
                }
            }
            MarkerKind::Finish => match open.remove(&key) {
                Some(start) if marker.time >= start.time => intervals.push(Interval {
                    rank: marker.rank,
                    phase: marker.phase,
                    start: start.time,
                    end: marker.time,
                }),
                Some(_) => out.skip(
                    extractor,
                    ExtractError::Parse {
                        line: marker.line,
                        reason: format!("phase {} finished before it started", marker.phase),
                    },
                ),
                None => out.skip(
                    extractor,
                    ExtractError::Parse {
                        line: marker.line,
                        reason: format!(
                            "finish of phase {} without a matching start on rank {}",
                            marker.phase, marker.rank
                        ),
                    },
                ),
            },
        }
    }

    (intervals, open.into_keys().collect())
}

/// Extract one [`TimingRecord`] per (rank, phase).
///
/// Repeated intervals of the same phase on the same rank are summed. A
/// phase still open at the end of the log yields no record for that rank.
/// Every rank with a finished total also gets a [`Phase::Intermediate`]
/// record.
pub fn extract_timing<S: AsRef<str>>(lines: &[S]) -> Extraction<TimingRecord> {
    let mut out = Extraction::default();
    let (intervals, unfinished) = pair_markers(lines, EXTRACTOR, &mut out);

    let mut totals: BTreeMap<(Rank, Phase), f64> = BTreeMap::new();
    for interval in intervals {
        *totals.entry((interval.rank, interval.phase)).or_default() +=
            seconds_between(interval.start, interval.end);
    }

    for (rank, phase) in unfinished {
        totals.remove(&(rank, phase));
        out.skip(EXTRACTOR, ExtractError::Unfinished { rank, phase });
    }

    let intermediate = intermediate_times(&totals);
    totals.extend(intermediate);

    out.records = totals
        .into_iter()
        .map(|((process_rank, phase), wall_seconds)| TimingRecord {
            phase,
            process_rank,
            wall_seconds,
        })
        .collect();
    out
}

/// Total minus the top-level phases, per rank. Missing phases count as
/// zero and the result never drops below zero.
fn intermediate_times(totals: &BTreeMap<(Rank, Phase), f64>) -> Vec<((Rank, Phase), f64)> {
    totals
        .iter()
        .filter(|((_, phase), _)| *phase == Phase::Total)
        .map(|(&(rank, _), &total)| {
            let phases: f64 = Phase::TOP_LEVEL
                .iter()
                .filter_map(|&phase| totals.get(&(rank, phase)))
                .sum();
            ((rank, Phase::Intermediate), (total - phases).max(0.0))
        })
        .collect()
}
