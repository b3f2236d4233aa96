// NodeSleuth - core/window.rs
//
// Window accumulation: folds the classifier interval stream into per-pod
// windows.
//
// Both accumulators key windows by `(namespace, name)`. The node is carried
// on the window but is not part of the key: the same pod identity showing
// up on two nodes at once is exactly what the overlap detector looks for.
//
// Accumulation is order sensitive ("first wins"); callers feed intervals
// sorted by `from`.

use crate::core::classify::probe::STATUS_READY;
use crate::core::model::{annotation, locator_key, reason, EventInterval};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Probe kind whose status transitions open and close windows.
const TRACKED_PROBE: &str = "readiness";

type Key = (String, String);

// =============================================================================
// Window
// =============================================================================

/// One lifecycle instance of a pod identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    pub namespace: String,
    pub name: String,
    /// Node of the event that created the window.
    pub node: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Window {
    pub fn new(namespace: &str, name: &str, node: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            node: node.to_string(),
            from: None,
            to: None,
        }
    }

    /// Both bounds observed and strictly ordered.
    pub fn is_complete(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from < to)
    }
}

/// Common surface of the accumulators.
pub trait WindowAccumulator {
    /// Fold one interval in. Returns true when the interval was relevant.
    fn observe(&mut self, interval: &EventInterval) -> bool;

    /// Final windows, grouped by key in key order, episodes in creation order.
    fn result(&self) -> Vec<Window>;
}

/// Identity and node of a pod-scoped interval.
fn identity(interval: &EventInterval) -> Option<(Key, &str)> {
    let ns = interval.locator.get(locator_key::NAMESPACE)?;
    let pod = interval.locator.get(locator_key::POD)?;
    let node = interval
        .locator
        .get(locator_key::NODE)
        .or_else(|| interval.annotation(annotation::NODE))
        .unwrap_or_default();
    Some(((ns.to_string(), pod.to_string()), node))
}

// =============================================================================
// Probe accumulator
// =============================================================================

/// Unready/ready windows from readiness probe status events. A key may
/// accumulate several sequential episodes.
#[derive(Debug, Default)]
pub struct ProbeAccumulator {
    windows: BTreeMap<Key, Vec<Window>>,
}

impl ProbeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowAccumulator for ProbeAccumulator {
    fn observe(&mut self, interval: &EventInterval) -> bool {
        if interval.reason() != reason::PROBE_STATUS
            || interval.annotation(annotation::PROBE) != Some(TRACKED_PROBE)
        {
            return false;
        }
        let Some((key, node)) = identity(interval) else {
            return false;
        };
        let status = interval.annotation(annotation::STATUS).unwrap_or_default();
        let ready = status == STATUS_READY;
        let at = interval.from;

        let episodes = self.windows.entry(key.clone()).or_default();
        let start_new = match episodes.last() {
            None => true,
            Some(last) => last.is_complete() && !ready,
        };
        if start_new {
            episodes.push(Window::new(&key.0, &key.1, node));
        }
        let Some(current) = episodes.last_mut() else {
            return false;
        };

        if ready {
            // First ready after the unready run closes the window; later
            // ready events are duplicates.
            if !current.is_complete() && current.to.is_none() {
                current.to = Some(at);
            }
        } else if current.from.is_none() {
            current.from = Some(at);
        }
        true
    }

    fn result(&self) -> Vec<Window> {
        self.windows.values().flatten().cloned().collect()
    }
}

// =============================================================================
// Lifecycle accumulator
// =============================================================================

/// Start/die windows from PLEG events. One window per key.
#[derive(Debug, Default)]
pub struct LifecycleAccumulator {
    windows: BTreeMap<Key, Window>,
}

impl LifecycleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowAccumulator for LifecycleAccumulator {
    fn observe(&mut self, interval: &EventInterval) -> bool {
        let started = match interval.reason() {
            reason::CONTAINER_STARTED => true,
            reason::CONTAINER_DIED => false,
            _ => return false,
        };
        let Some((key, node)) = identity(interval) else {
            return false;
        };
        let window = self
            .windows
            .entry(key)
            .or_insert_with_key(|(ns, pod)| Window::new(ns, pod, node));

        if started {
            // Earliest start across the pod's containers.
            if window.from.is_none() {
                window.from = Some(interval.from);
            }
        } else {
            // Latest death wins.
            window.to = Some(interval.from);
        }
        true
    }

    fn result(&self) -> Vec<Window> {
        self.windows.values().cloned().collect()
    }
}
