// NodeSleuth - core/report.rs
//
// Report records: the pass/fail/skip verdicts produced from scored and raw
// intervals.
//
// A flagged check normally yields a failing record *and* a passing record
// with the same name. Consumers that treat a name with at least one passing
// record as a flake keep the check non-blocking while still carrying the
// evidence. `ConcurrencyPolicy::Fail` drops the companion pass for the
// window concurrency checks.

use crate::core::model::EventInterval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one report record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Nothing to analyse.
    Skip,
    Pass,
    Fail,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Skip => "SKIP",
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a concurrency finding also emits a passing companion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Failing record plus passing companion.
    #[default]
    Flake,
    /// Failing record only.
    Fail,
}

impl ConcurrencyPolicy {
    /// Parse a config value. Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "flake" => Some(Self::Flake),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// A named check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub name: String,
    pub verdict: Verdict,
    /// Failure evidence or skip reason; empty for passes.
    pub evidence: String,
}

impl ReportRecord {
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verdict: Verdict::Pass,
            evidence: String::new(),
        }
    }

    pub fn fail(name: &str, evidence: String) -> Self {
        Self {
            name: name.to_string(),
            verdict: Verdict::Fail,
            evidence,
        }
    }

    pub fn skip(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            verdict: Verdict::Skip,
            evidence: reason.to_string(),
        }
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verdict, self.name)?;
        if !self.evidence.is_empty() {
            for line in self.evidence.lines() {
                write!(f, "\n    {line}")?;
            }
        }
        Ok(())
    }
}

/// Verdict for one set of scored windows.
///
/// Zero intervals skip; intervals without a concurrency annotation pass;
/// otherwise every concurrent interval's rendering becomes evidence.
pub fn concurrency_records(
    name: &str,
    scored: &[EventInterval],
    policy: ConcurrencyPolicy,
) -> Vec<ReportRecord> {
    if scored.is_empty() {
        return vec![ReportRecord::skip(name, "no windows were observed")];
    }
    let evidence: Vec<String> = scored
        .iter()
        .filter(|i| i.is_concurrent())
        .map(|i| i.to_string())
        .collect();
    if evidence.is_empty() {
        return vec![ReportRecord::pass(name)];
    }

    let failure = ReportRecord::fail(
        name,
        format!(
            "{} concurrent windows detected.\n\n{}",
            evidence.len(),
            evidence.join("\n")
        ),
    );
    match policy {
        ConcurrencyPolicy::Flake => vec![failure, ReportRecord::pass(name)],
        ConcurrencyPolicy::Fail => vec![failure],
    }
}

/// Failure plus passing companion when `failures` is non-empty, a lone pass
/// otherwise.
pub fn flake_records(name: &str, summary: &str, failures: &[String]) -> Vec<ReportRecord> {
    if failures.is_empty() {
        return vec![ReportRecord::pass(name)];
    }
    vec![
        ReportRecord::fail(name, format!("{summary}\n\n{}", failures.join("\n"))),
        ReportRecord::pass(name),
    ]
}

/// Failure alone when `failures` is non-empty, a lone pass otherwise.
pub fn hard_records(name: &str, summary: &str, failures: &[String]) -> Vec<ReportRecord> {
    if failures.is_empty() {
        return vec![ReportRecord::pass(name)];
    }
    vec![ReportRecord::fail(
        name,
        format!("{summary}\n\n{}", failures.join("\n")),
    )]
}

/// True when some name has a failing record and no passing record.
pub fn has_blocking_failure(records: &[ReportRecord]) -> bool {
    records.iter().any(|r| {
        r.verdict == Verdict::Fail
            && !records
                .iter()
                .any(|p| p.name == r.name && p.verdict == Verdict::Pass)
    })
}
