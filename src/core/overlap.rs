// NodeSleuth - core/overlap.rs
//
// Concurrent-window detection and scoring.
//
// Windows from one accumulator are sorted by start and each complete window
// scans forward for the first later-starting complete window on another
// node that begins before it ends. Only the earlier-starting window of a
// conflicting pair is flagged.

use crate::core::model::{
    annotation, format_duration, EventInterval, Level, Locator, Message, Source, UNSET_INSTANT,
};
use crate::core::window::Window;
use chrono::{DateTime, Utc};

/// How scored windows of one accumulator are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringLabel<'a> {
    /// Role placed on the locator, e.g. `etcd` or `installer`.
    pub role: &'a str,
    /// Reason code of every scored interval.
    pub reason: &'a str,
}

/// Score every window, returning one interval per window in start order.
pub fn detect(windows: &[Window], label: ScoringLabel<'_>) -> Vec<EventInterval> {
    let mut sorted: Vec<&Window> = windows.iter().collect();
    sorted.sort_by_key(|w| w.from.unwrap_or(UNSET_INSTANT));

    let mut scored = Vec::with_capacity(sorted.len());
    let mut conflicts = 0usize;
    for (i, w) in sorted.iter().enumerate() {
        let interval = if w.is_complete() {
            let conflict = first_conflict(w, &sorted[i + 1..]);
            if conflict.is_some() {
                conflicts += 1;
            }
            score_complete(w, conflict, label)
        } else {
            score_incomplete(w, label)
        };
        scored.push(interval);
    }

    tracing::debug!(
        role = label.role,
        windows = scored.len(),
        conflicts,
        "Windows scored"
    );
    scored
}

/// First window in `later` (sorted by start) that overlaps `w` on a
/// different node. Windows that merely touch do not overlap.
fn first_conflict<'w>(w: &Window, later: &[&'w Window]) -> Option<&'w Window> {
    let end = w.to?;
    for &other in later {
        if !other.is_complete() {
            continue;
        }
        let Some(start) = other.from else {
            continue;
        };
        if start >= end {
            // Sorted by start: nothing further can overlap.
            break;
        }
        if other.node != w.node {
            return Some(other);
        }
    }
    None
}

fn bounds(w: &Window) -> (DateTime<Utc>, DateTime<Utc>) {
    (w.from.unwrap_or(UNSET_INSTANT), w.to.unwrap_or(UNSET_INSTANT))
}

fn score_complete(w: &Window, conflict: Option<&Window>, label: ScoringLabel<'_>) -> EventInterval {
    let (from, to) = bounds(w);
    let mut human = format!(
        "{}/{} on {} for {}",
        w.namespace,
        w.name,
        w.node,
        format_duration(to - from)
    );
    let mut message = Message::default();
    let mut level = Level::Info;

    if let Some(o) = conflict {
        let gap = o.from.unwrap_or(UNSET_INSTANT) - from;
        human.push_str(&format!(
            ", concurrent with {}/{} on {} starting {} later",
            o.namespace,
            o.name,
            o.node,
            format_duration(gap)
        ));
        message = message
            .with_annotation(annotation::CONCURRENT_NODE, &o.node)
            .with_annotation(annotation::CONCURRENT_POD, &o.name);
        level = Level::Error;
        tracing::debug!(
            pod = %w.name,
            node = %w.node,
            concurrent_pod = %o.name,
            concurrent_node = %o.node,
            "Concurrent window detected"
        );
    }

    message.human = human;
    EventInterval::span(
        Source::StaticPodWindows,
        level,
        Locator::node_role(&w.node, label.role),
        message.with_reason(label.reason).with_node(&w.node),
        from,
        to,
    )
}

/// Incomplete windows are always errors. The reported duration may be
/// meaningless when a bound is unset.
fn score_incomplete(w: &Window, label: ScoringLabel<'_>) -> EventInterval {
    let (from, to) = bounds(w);
    EventInterval::span(
        Source::StaticPodWindows,
        Level::Error,
        Locator::node_role(&w.node, label.role),
        Message::human(format!(
            "{}/{} on {} incomplete window, duration {}",
            w.namespace,
            w.name,
            w.node,
            format_duration(to - from)
        ))
        .with_reason(label.reason)
        .with_node(&w.node),
        from,
        to,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{locator_key, reason};
    use chrono::TimeZone;

    const LABEL: ScoringLabel<'static> = ScoringLabel {
        role: "installer",
        reason: reason::INSTALLER_WINDOW,
    };

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn win(name: &str, node: &str, from: Option<i64>, to: Option<i64>) -> Window {
        let mut w = Window::new("openshift-etcd", name, node);
        w.from = from.map(t);
        w.to = to.map(t);
        w
    }

    fn find<'a>(out: &'a [EventInterval], node: &str) -> &'a EventInterval {
        out.iter()
            .find(|i| i.locator.get(locator_key::NODE) == Some(node))
            .unwrap()
    }

    #[test]
    fn test_only_earlier_window_is_flagged() {
        let out = detect(
            &[
                win("installer-b", "node2", Some(1), Some(11)),
                win("installer-a", "node1", Some(0), Some(10)),
            ],
            LABEL,
        );
        let a = find(&out, "node1");
        let b = find(&out, "node2");
        assert_eq!(a.level, Level::Error);
        assert_eq!(a.annotation(annotation::CONCURRENT_NODE), Some("node2"));
        assert_eq!(a.annotation(annotation::CONCURRENT_POD), Some("installer-b"));
        assert!(a.message.human.contains("starting 1.000s later"));
        assert_eq!(b.level, Level::Info);
        assert!(!b.is_concurrent());
    }

    #[test]
    fn test_same_node_never_flags() {
        let out = detect(
            &[
                win("installer-a", "node1", Some(0), Some(10)),
                win("installer-b", "node1", Some(1), Some(11)),
            ],
            LABEL,
        );
        assert!(out.iter().all(|i| i.level == Level::Info && !i.is_concurrent()));
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        let out = detect(
            &[
                win("installer-a", "node1", Some(0), Some(10)),
                win("installer-b", "node2", Some(10), Some(20)),
            ],
            LABEL,
        );
        assert!(out.iter().all(|i| i.level == Level::Info));
    }

    #[test]
    fn test_incomplete_window_always_error() {
        let out = detect(&[win("installer-a", "node1", Some(0), None)], LABEL);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].level, Level::Error);
        assert!(out[0].is_open());
        assert!(!out[0].is_concurrent());
        assert!(out[0].message.human.contains("incomplete window"));
    }

    #[test]
    fn test_incomplete_candidates_are_skipped() {
        let out = detect(
            &[
                win("installer-a", "node1", Some(0), Some(10)),
                win("installer-b", "node2", Some(2), None),
                win("installer-c", "node3", Some(5), Some(15)),
            ],
            LABEL,
        );
        let a = find(&out, "node1");
        assert_eq!(a.annotation(annotation::CONCURRENT_NODE), Some("node3"));
        assert_eq!(find(&out, "node2").level, Level::Error);
        assert_eq!(find(&out, "node3").level, Level::Info);
    }

    #[test]
    fn test_scan_stops_after_window_end() {
        let out = detect(
            &[
                win("installer-a", "node1", Some(0), Some(10)),
                win("installer-b", "node1", Some(5), Some(8)),
                win("installer-c", "node2", Some(12), Some(20)),
            ],
            LABEL,
        );
        assert!(out.iter().all(|i| !i.is_concurrent()));
    }

    #[test]
    fn test_scored_locator_and_bounds() {
        let out = detect(&[win("installer-a", "node1", Some(0), Some(10))], LABEL);
        assert_eq!(out[0].locator, Locator::node_role("node1", "installer"));
        assert_eq!((out[0].from, out[0].to), (t(0), t(10)));
        assert_eq!(out[0].source, Source::StaticPodWindows);
        assert_eq!(out[0].reason(), reason::INSTALLER_WINDOW);
    }

    #[test]
    fn test_output_in_start_order() {
        let out = detect(
            &[
                win("installer-c", "n3", Some(30), Some(31)),
                win("installer-a", "n1", Some(10), Some(11)),
                win("installer-b", "n2", Some(20), Some(21)),
            ],
            LABEL,
        );
        let starts: Vec<_> = out.iter().map(|i| i.from).collect();
        assert_eq!(starts, vec![t(10), t(20), t(30)]);
    }
}
