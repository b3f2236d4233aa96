// NodeSleuth - core/checks.rs
//
// Per-reason report checks over the raw classifier intervals.
//
// Each check selects intervals by reason and turns the matches into report
// records. Most checks flake (failure plus passing companion); panics fail
// outright.

use crate::core::model::{cause, locator_key, reason, EventInterval, Source};
use crate::core::report::{flake_records, hard_records, ReportRecord};
use crate::util::constants::{LEASE_BACKOFF_CLUSTER_SECS, LEASE_UPDATE_GRACE_MINUTES};
use chrono::{SecondsFormat, TimeDelta};
use std::collections::BTreeMap;

pub const HTTP_CONNECTION_LOST: &str =
    "[sig-node] kubelet logs do not contain http client connection lost errors";
pub const ERR_IMAGE_PULL_SIGNATURE: &str =
    "[sig-node] kubelet logs do not contain ErrImagePull unrecognized signature format";
pub const LATE_LEASE_UPDATE: &str = "[sig-node] kubelet logs do not contain late lease update errors";
pub const LEASE_BACKOFF: &str = "[sig-node] kubelet should not repeatedly fall back to ensure lease";
pub const ANONYMOUS_USER: &str = "[sig-node] kubelet should not use an anonymous user";
pub const CGROUP_CLEANUP: &str = "[sig-node] kubelet should be able to delete cgroups path";
pub const KUBELET_PANIC: &str = "[sig-node] kubelet should not panic";
pub const CRIO_PANIC: &str = "[sig-node] CRI-O should not panic";
pub const CORE_DUMP: &str = "[sig-node] node processes should not dump core";

/// Run every per-reason check.
pub fn run_all(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let mut records = Vec::new();
    records.extend(http_connection_lost(intervals));
    records.extend(err_image_pull_signature(intervals));
    records.extend(late_lease_update(intervals));
    records.extend(lease_backoff(intervals));
    records.extend(anonymous_user(intervals));
    records.extend(cgroup_cleanup(intervals));
    records.extend(kubelet_panic(intervals));
    records.extend(crio_panic(intervals));
    records.extend(core_dump(intervals));
    records
}

fn evidence(i: &EventInterval) -> String {
    format!("{} - {}", i.locator, i.message)
}

fn with_reason<'a>(
    intervals: &'a [EventInterval],
    reason_code: &'a str,
) -> impl Iterator<Item = &'a EventInterval> + 'a {
    intervals.iter().filter(move |i| i.reason() == reason_code)
}

pub fn http_connection_lost(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::HTTP_CLIENT_CONNECTION_LOST)
        .map(evidence)
        .collect();
    flake_records(
        HTTP_CONNECTION_LOST,
        &format!(
            "{} kubelet logs contain errors from http client connections lost unexpectedly.",
            failures.len()
        ),
        &failures,
    )
}

pub fn err_image_pull_signature(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::ERR_IMAGE_PULL)
        .filter(|i| i.message.cause == cause::UNRECOGNIZED_SIGNATURE_FORMAT)
        .map(evidence)
        .collect();
    flake_records(
        ERR_IMAGE_PULL_SIGNATURE,
        &format!(
            "{} kubelet logs contain errors from ErrImagePull unrecognized signature format.",
            failures.len()
        ),
        &failures,
    )
}

/// Lease update failures after the grace period that follows the earliest
/// observed interval. Early failures are normal during bootstrap.
pub fn late_lease_update(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = match intervals.iter().map(|i| i.from).min() {
        None => Vec::new(),
        Some(first) => {
            let cutoff = first + TimeDelta::minutes(LEASE_UPDATE_GRACE_MINUTES);
            with_reason(intervals, reason::NODE_FAILED_LEASE)
                .filter(|i| i.from > cutoff)
                .map(|i| {
                    format!(
                        "{} {}",
                        i.from.to_rfc3339_opts(SecondsFormat::Secs, true),
                        evidence(i)
                    )
                })
                .collect()
        }
    };
    flake_records(
        LATE_LEASE_UPDATE,
        &format!(
            "{} late updating lease errors contained in kubelet logs.",
            failures.len()
        ),
        &failures,
    )
}

/// Lease backoff intervals that are followed by another backoff on the same
/// node within the cluster window.
pub fn important_lease_backoffs(intervals: &[EventInterval]) -> Vec<&EventInterval> {
    let window = TimeDelta::seconds(LEASE_BACKOFF_CLUSTER_SECS);
    let mut by_node: BTreeMap<&str, Vec<&EventInterval>> = BTreeMap::new();
    for i in with_reason(intervals, reason::NODE_FAILED_LEASE_BACKOFF) {
        let node = i.locator.get(locator_key::NODE).unwrap_or_default();
        let entries = by_node.entry(node).or_default();
        // Identical timestamps on one node are the same event logged twice.
        let duplicate = entries
            .last()
            .is_some_and(|prev| prev.from == i.from || prev.to == i.to);
        if !duplicate {
            entries.push(i);
        }
    }

    let mut important = Vec::new();
    for entries in by_node.values() {
        for pair in entries.windows(2) {
            if pair[1].to < pair[0].to + window {
                important.push(pair[0]);
            }
        }
    }
    important
}

pub fn lease_backoff(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = important_lease_backoffs(intervals)
        .into_iter()
        .map(|i| {
            format!(
                "{} {}",
                i.from.to_rfc3339_opts(SecondsFormat::Secs, true),
                evidence(i)
            )
        })
        .collect();
    flake_records(
        LEASE_BACKOFF,
        &format!(
            "{} lease backoffs followed by another within {LEASE_BACKOFF_CLUSTER_SECS}s on the same node.",
            failures.len()
        ),
        &failures,
    )
}

pub fn anonymous_user(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> =
        with_reason(intervals, reason::FAILED_TO_AUTHENTICATE_WITH_OPENSHIFT_USER)
            .filter(|i| i.source == Source::KubeletLog)
            .map(evidence)
            .collect();
    flake_records(
        ANONYMOUS_USER,
        &format!(
            "kubelet logs contain {} failures using an anonymous user.",
            failures.len()
        ),
        &failures,
    )
}

pub fn cgroup_cleanup(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::FAILED_TO_DELETE_CGROUPS_PATH)
        .map(evidence)
        .collect();
    flake_records(
        CGROUP_CLEANUP,
        &format!(
            "kubelet logs contain {} failures to delete cgroups path.",
            failures.len()
        ),
        &failures,
    )
}

pub fn kubelet_panic(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::KUBELET_PANIC)
        .map(evidence)
        .collect();
    hard_records(
        KUBELET_PANIC,
        &format!("{} kubelet panics detected.", failures.len()),
        &failures,
    )
}

pub fn crio_panic(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::CRIO_PANIC)
        .map(evidence)
        .collect();
    hard_records(
        CRIO_PANIC,
        &format!("{} CRI-O panics detected.", failures.len()),
        &failures,
    )
}

pub fn core_dump(intervals: &[EventInterval]) -> Vec<ReportRecord> {
    let failures: Vec<String> = with_reason(intervals, reason::PROCESS_DUMPED_CORE)
        .map(evidence)
        .collect();
    flake_records(
        CORE_DUMP,
        &format!("{} processes dumped core.", failures.len()),
        &failures,
    )
}
