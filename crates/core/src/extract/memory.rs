//! Peak memory usage lines.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{tagged_lines, ExtractError, Extraction};
use crate::phase::Phase;
use crate::types::Rank;

const EXTRACTOR: &str = "memory";

const KEYWORD: &str = "Peak memory usage";

static MEMORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Peak memory usage(?: during (?P<phase>[a-zA-Z ]+?))?: (?P<value>[0-9]+(?:\.[0-9]+)?) ?(?P<unit>B|KB|MB|GB|TB)\.?$",
    )
    .expect("valid regex")
});

/// Peak memory of one rank, optionally attributed to a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub process_rank: Rank,
    pub peak_bytes: u64,
    /// `None` for the whole-run peak.
    pub phase: Option<Phase>,
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

/// Extract every peak memory line, in log order.
pub fn extract_memory<S: AsRef<str>>(lines: &[S]) -> Extraction<MemoryRecord> {
    let mut out = Extraction::default();

    for line in tagged_lines(lines, &[KEYWORD], EXTRACTOR, &mut out) {
        let Some(caps) = MEMORY_RE.captures(line.message) else {
            out.skip(
                EXTRACTOR,
                ExtractError::Parse {
                    line: line.number,
                    reason: format!("malformed memory line \"{}\"", line.message),
                },
            );
            continue;
        };

        let phase = match caps.name("phase") {
            Some(name) => match Phase::from_log_name(name.as_str()) {
                Some(phase) => Some(phase),
                None => {
                    out.skip(
                        EXTRACTOR,
                        ExtractError::Parse {
                            line: line.number,
                            reason: format!("unknown phase \"{}\"", name.as_str()),
                        },
                    );
                    continue;
                }
            },
            None => None,
        };

        let value: f64 = match caps["value"].parse() {
            Ok(v) => v,
            Err(e) => {
                out.skip(
                    EXTRACTOR,
                    ExtractError::Parse {
                        line: line.number,
                        reason: format!("invalid memory value: {e}"),
                    },
                );
                continue;
            }
        };

        out.records.push(MemoryRecord {
            process_rank: line.rank,
            peak_bytes: (value * unit_multiplier(&caps["unit"])).round() as u64,
            phase,
        });
    }

    out
}
