// NodeSleuth - core/analysis.rs
//
// Post-collection analysis: accumulate windows from the classifier stream,
// score them for concurrency, and run the per-reason checks.
//
// Entirely single-threaded and side-effect free apart from logging.

use crate::core::checks;
use crate::core::model::{reason, EventInterval};
use crate::core::overlap::{detect, ScoringLabel};
use crate::core::report::{concurrency_records, ConcurrencyPolicy, ReportRecord};
use crate::core::window::{LifecycleAccumulator, ProbeAccumulator, WindowAccumulator};
use crate::util::constants::{LIFECYCLE_WINDOW_ROLE, PROBE_WINDOW_ROLE};

pub const PROBE_CONCURRENCY_CHECK: &str =
    "[sig-etcd] static pod readiness windows should not overlap across nodes";
pub const INSTALLER_CONCURRENCY_CHECK: &str =
    "[sig-etcd] installer pods should not run concurrently on different nodes";

/// Everything one analysis pass produces.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Classifier intervals, stably sorted by `from`.
    pub intervals: Vec<EventInterval>,
    /// Scored readiness windows.
    pub probe_windows: Vec<EventInterval>,
    /// Scored installer lifecycle windows.
    pub installer_windows: Vec<EventInterval>,
    pub reports: Vec<ReportRecord>,
}

impl Analysis {
    /// All scored windows, readiness first.
    pub fn scored(&self) -> Vec<EventInterval> {
        self.probe_windows
            .iter()
            .chain(self.installer_windows.iter())
            .cloned()
            .collect()
    }
}

/// Run the analysis over the merged classifier output of every node.
pub fn analyze(mut intervals: Vec<EventInterval>, policy: ConcurrencyPolicy) -> Analysis {
    // Accumulators keep the first event they see, so feed them in time order.
    intervals.sort_by_key(|i| i.from);

    let mut probes = ProbeAccumulator::new();
    let mut lifecycles = LifecycleAccumulator::new();
    for interval in &intervals {
        if !probes.observe(interval) {
            lifecycles.observe(interval);
        }
    }

    let probe_windows = detect(
        &probes.result(),
        ScoringLabel {
            role: PROBE_WINDOW_ROLE,
            reason: reason::READINESS_WINDOW,
        },
    );
    let installer_windows = detect(
        &lifecycles.result(),
        ScoringLabel {
            role: LIFECYCLE_WINDOW_ROLE,
            reason: reason::INSTALLER_WINDOW,
        },
    );

    let run_empty = intervals.is_empty();
    let mut reports = Vec::new();
    reports.extend(window_records(
        PROBE_CONCURRENCY_CHECK,
        &probe_windows,
        run_empty,
        policy,
    ));
    reports.extend(window_records(
        INSTALLER_CONCURRENCY_CHECK,
        &installer_windows,
        run_empty,
        policy,
    ));
    reports.extend(checks::run_all(&intervals));

    tracing::info!(
        intervals = intervals.len(),
        probe_windows = probe_windows.len(),
        installer_windows = installer_windows.len(),
        reports = reports.len(),
        "Analysis complete"
    );

    Analysis {
        intervals,
        probe_windows,
        installer_windows,
        reports,
    }
}

/// Skip is reserved for a run with no intervals at all; an accumulator that
/// saw nothing in a non-empty run passes.
fn window_records(
    name: &str,
    scored: &[EventInterval],
    run_empty: bool,
    policy: ConcurrencyPolicy,
) -> Vec<ReportRecord> {
    if scored.is_empty() && !run_empty {
        return vec![ReportRecord::pass(name)];
    }
    concurrency_records(name, scored, policy)
}
