//! Photon package launch progress per rank.
//!
//! Log buffering can interleave the output of different ranks, so a
//! record may appear one line later than its timestamp says. Progress is
//! reordered within that one-record window; anything displaced further is
//! rejected with [`ExtractError::Ordering`] so that every rank's output is
//! monotonic in time.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{tagged_lines, ExtractError, Extraction};
use crate::phase::Phase;
use crate::types::{LogTime, Rank};

const EXTRACTOR: &str = "progress";

const KEYWORD: &str = "Launched ";

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Launched (?P<phase>[a-zA-Z ]+?) photon packages: (?P<pct>[0-9]+(?:\.[0-9]+)?)%$")
        .expect("valid regex")
});

/// Fraction of a phase's photon packages launched by one rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub phase: Phase,
    pub process_rank: Rank,
    /// In `0.0..=1.0`.
    pub fraction_complete: f64,
    pub timestamp: LogTime,
}

#[derive(Debug, Default)]
struct RankQueue {
    emitted: Vec<ProgressRecord>,
    pending: Option<ProgressRecord>,
    /// The pending record already let one later-stamped record pass.
    pending_displaced: bool,
}

impl RankQueue {
    fn last_time(&self) -> Option<LogTime> {
        self.emitted.last().map(|r| r.timestamp)
    }

    /// Accept `record`, or return it if it is out of order beyond the window.
    fn push(&mut self, record: ProgressRecord) -> Result<(), ProgressRecord> {
        let behind_emitted = self.last_time().is_some_and(|last| record.timestamp < last);
        let Some(pending) = self.pending.take() else {
            if behind_emitted {
                return Err(record);
            }
            self.pending = Some(record);
            self.pending_displaced = false;
            return Ok(());
        };

        if record.timestamp >= pending.timestamp {
            self.emitted.push(pending);
            self.pending = Some(record);
            self.pending_displaced = false;
            Ok(())
        } else if !behind_emitted && !self.pending_displaced {
            // Swap within the one-record window.
            self.emitted.push(record);
            self.pending = Some(pending);
            self.pending_displaced = true;
            Ok(())
        } else {
            self.pending = Some(pending);
            Err(record)
        }
    }

    fn finish(mut self) -> Vec<ProgressRecord> {
        if let Some(pending) = self.pending.take() {
            self.emitted.push(pending);
        }
        self.emitted
    }
}

/// Extract per-rank progress, ordered by rank and then by time.
pub fn extract_progress<S: AsRef<str>>(lines: &[S]) -> Extraction<ProgressRecord> {
    let mut out = Extraction::default();
    let mut queues: BTreeMap<Rank, RankQueue> = BTreeMap::new();

    for line in tagged_lines(lines, &[KEYWORD], EXTRACTOR, &mut out) {
        let Some(caps) = PROGRESS_RE.captures(line.message) else {
            out.skip(
                EXTRACTOR,
                ExtractError::Parse {
                    line: line.number,
                    reason: format!("malformed progress line \"{}\"", line.message),
                },
            );
            continue;
        };

        let Some(phase) = Phase::from_log_name(&caps["phase"]) else {
            out.skip(
                EXTRACTOR,
                ExtractError::Parse {
                    line: line.number,
                    reason: format!("unknown phase \"{}\"", &caps["phase"]),
                },
            );
            continue;
        };

        let percent: f64 = match caps["pct"].parse() {
            Ok(p) if (0.0..=100.0).contains(&p) => p,
            _ => {
                out.skip(
                    EXTRACTOR,
                    ExtractError::Parse {
                        line: line.number,
                        reason: format!("progress \"{}%\" outside 0-100", &caps["pct"]),
                    },
                );
                continue;
            }
        };

        let record = ProgressRecord {
            phase,
            process_rank: line.rank,
            fraction_complete: percent / 100.0,
            timestamp: line.time,
        };

        if let Err(rejected) = queues.entry(line.rank).or_default().push(record) {
            out.skip(
                EXTRACTOR,
                ExtractError::Ordering {
                    line: line.number,
                    rank: rejected.process_rank,
                    phase: rejected.phase,
                },
            );
        }
    }

    out.records = queues.into_values().flat_map(RankQueue::finish).collect();
    out
}
