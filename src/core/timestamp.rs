// NodeSleuth - core/timestamp.rs
//
// Journal timestamp resolution.
//
// Journal dumps prefix every line with a year-less `Mon DD HH:MM:SS.ffffff`
// stamp. The year comes from the caller (config override or current year).
// Resolution never fails from the caller's point of view: an unparsable
// stamp becomes "now", so the line sorts to the end of any time-ordered
// view instead of being dropped.

use crate::util::error::ParseError;
use crate::util::logging::preview;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Layout of the synthesised `DAY MONTH YEAR TIME` string.
const SYNTHESISED_LAYOUT: &str = "%d %b %Y %H:%M:%S%.f";

/// Resolves the journal prefix of a line to an absolute UTC instant.
#[derive(Debug, Clone)]
pub struct TimestampResolver {
    prefix: Regex,
}

impl Default for TimestampResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampResolver {
    pub fn new() -> Self {
        Self {
            prefix: Regex::new(r"^(?P<MONTH>\S+)\s(?P<DAY>\S+)\s(?P<TIME>\S+)")
                .expect("TimestampResolver: invalid prefix regex"),
        }
    }

    /// Resolve `line` against `year`, substituting the current instant on
    /// failure. Failures are reported as warnings on target
    /// `nodesleuth::timestamp`.
    pub fn resolve(&self, line: &str, year: i32) -> DateTime<Utc> {
        match self.try_resolve(line, year) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    target: "nodesleuth::timestamp",
                    error = %e,
                    line = preview(line),
                    "Timestamp unparsable, substituting current time"
                );
                Utc::now()
            }
        }
    }

    /// Fallible form of [`resolve`](Self::resolve).
    pub fn try_resolve(&self, line: &str, year: i32) -> Result<DateTime<Utc>, ParseError> {
        let caps = self
            .prefix
            .captures(line)
            .ok_or_else(|| ParseError::MissingTimestamp {
                line: preview(line).to_string(),
            })?;
        let raw = format!("{} {} {} {}", &caps["DAY"], &caps["MONTH"], year, &caps["TIME"]);
        NaiveDateTime::parse_from_str(&raw, SYNTHESISED_LAYOUT)
            .map(|naive| naive.and_utc())
            .map_err(|e| ParseError::Timestamp {
                raw,
                reason: e.to_string(),
            })
    }
}
