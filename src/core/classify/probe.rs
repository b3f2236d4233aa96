// NodeSleuth - core/classify/probe.rs
//
// Kubelet probe and pod lifecycle classifiers.
//
// `ProbeFailureClassifier` reports readiness/startup probe failures against
// the container they concern. The two sync-loop classifiers feed the window
// accumulators: probe status transitions and PLEG container start/die
// events, restricted to the pods an identity filter accepts.

use super::{compile, container_locator, extract_output, Classified, IdentityFilter, LineClassifier, LineContext};
use crate::core::model::{annotation, reason, EventInterval, Level, Locator, Message, Source};
use crate::util::logging::preview;
use regex::Regex;

const PROBE_FAILED: &str = "Probe failed";
const PROBE_ERRORED: &str = "Probe errored";
const READINESS_TYPE: &str = r#"probeType="Readiness""#;
const STARTUP_TYPE: &str = r#"probeType="Startup""#;

/// Status value that closes a probe window.
pub const STATUS_READY: &str = "ready";

/// Older kubelets log an empty status for an unready probe.
pub const STATUS_NOT_READY: &str = "not ready";

// =============================================================================
// Readiness / startup probe failures
// =============================================================================

/// `"Probe failed"` / `"Probe errored"` lines for readiness and startup
/// probes.
pub struct ProbeFailureClassifier {
    container_ref: Regex,
    readiness_failure: Regex,
    readiness_error: Regex,
    startup_failure: Regex,
    /// Startup failures whose output continues on the next journal line.
    startup_failure_multiline: Regex,
}

impl Default for ProbeFailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeFailureClassifier {
    pub fn new() -> Self {
        Self {
            container_ref: compile(
                r#"pod="(?P<NS>[a-z0-9.-]+)/(?P<POD>[a-z0-9.-]+)" podUID="(?P<PODUID>[a-z0-9.-]+)" containerName="(?P<CONTAINER>[a-z0-9.-]+)""#,
            ),
            readiness_failure: compile(r#""Probe failed" probeType="Readiness".*output="(?P<OUTPUT>.+)""#),
            readiness_error: compile(r#""Probe errored" err="(?P<OUTPUT>.+)" probeType="Readiness""#),
            startup_failure: compile(r#""Probe failed" probeType="Startup".*output="(?P<OUTPUT>.+)""#),
            startup_failure_multiline: compile(r#""Probe failed" probeType="Startup".*output=<(?P<OUTPUT>.*)"#),
        }
    }

    /// Pick the output pattern and reason for a claimed line.
    fn pattern_for(&self, line: &str) -> Option<(&Regex, &'static str)> {
        let failed = line.contains(PROBE_FAILED);
        if line.contains(READINESS_TYPE) {
            return Some(if failed {
                (&self.readiness_failure, reason::READINESS_FAILED)
            } else {
                (&self.readiness_error, reason::READINESS_ERRORED)
            });
        }
        if !failed {
            return None;
        }
        if self.startup_failure.is_match(line) {
            Some((&self.startup_failure, reason::STARTUP_PROBE_FAILED))
        } else {
            Some((&self.startup_failure_multiline, reason::STARTUP_PROBE_FAILED))
        }
    }
}

impl LineClassifier for ProbeFailureClassifier {
    fn name(&self) -> &'static str {
        "probe-failure"
    }

    fn wants(&self, line: &str) -> bool {
        (line.contains(PROBE_FAILED) || line.contains(PROBE_ERRORED))
            && (line.contains(READINESS_TYPE) || line.contains(STARTUP_TYPE))
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let Some((pattern, reason_code)) = self.pattern_for(line) else {
            return Classified::claimed_empty();
        };
        let (Some(output), Some(locator)) = (
            extract_output(pattern, line),
            container_locator(&self.container_ref, line),
        ) else {
            tracing::debug!(
                node = ctx.node,
                line = preview(line),
                "Probe line claimed but fields missing"
            );
            return Classified::claimed_empty();
        };

        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            locator,
            Message::human(output)
                .with_reason(reason_code)
                .with_node(ctx.node),
            ctx.at(line),
        )])
    }
}

// =============================================================================
// SyncLoop (probe)
// =============================================================================

/// `"SyncLoop (probe)"` status transitions for the pods the filter accepts.
pub struct SyncLoopProbeClassifier {
    pattern: Regex,
    filter: IdentityFilter,
}

impl SyncLoopProbeClassifier {
    pub fn new(filter: IdentityFilter) -> Self {
        Self {
            pattern: compile(
                r#""SyncLoop \(probe\)" probe="(?P<PROBE>[a-z]+)" status="(?P<STATUS>[^"]*)" pod="(?P<NS>[a-z0-9.-]+)/(?P<POD>[a-z0-9.-]+)""#,
            ),
            filter,
        }
    }
}

impl LineClassifier for SyncLoopProbeClassifier {
    fn name(&self) -> &'static str {
        "syncloop-probe"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains(r#""SyncLoop (probe)""#)
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let Some(caps) = self.pattern.captures(line) else {
            return Classified::claimed_empty();
        };
        let (probe, namespace, pod) = (&caps["PROBE"], &caps["NS"], &caps["POD"]);
        if !(self.filter)(namespace, pod) {
            return Classified::claimed_empty();
        }
        let status = match &caps["STATUS"] {
            "" => STATUS_NOT_READY,
            s => s,
        };

        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::pod(namespace, pod, ctx.node),
            Message::human(format!("{probe} probe reported {status}"))
                .with_reason(reason::PROBE_STATUS)
                .with_node(ctx.node)
                .with_annotation(annotation::PROBE, probe)
                .with_annotation(annotation::STATUS, status),
            ctx.at(line),
        )])
    }
}

// =============================================================================
// SyncLoop (PLEG)
// =============================================================================

/// `"SyncLoop (PLEG): event for pod"` container start/die events for the
/// pods the filter accepts.
pub struct PlegClassifier {
    pattern: Regex,
    filter: IdentityFilter,
}

impl PlegClassifier {
    pub fn new(filter: IdentityFilter) -> Self {
        Self {
            pattern: compile(
                r#""SyncLoop \(PLEG\): event for pod" pod="(?P<NS>[a-z0-9.-]+)/(?P<POD>[a-z0-9.-]+)" event=\{"ID":"[a-z0-9-]+","Type":"(?P<TYPE>[A-Za-z]+)""#,
            ),
            filter,
        }
    }
}

impl LineClassifier for PlegClassifier {
    fn name(&self) -> &'static str {
        "syncloop-pleg"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains(r#""SyncLoop (PLEG): event for pod""#)
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let Some(caps) = self.pattern.captures(line) else {
            return Classified::claimed_empty();
        };
        let (namespace, pod) = (&caps["NS"], &caps["POD"]);
        if !(self.filter)(namespace, pod) {
            return Classified::claimed_empty();
        }
        let event = match &caps["TYPE"] {
            "ContainerStarted" => reason::CONTAINER_STARTED,
            "ContainerDied" => reason::CONTAINER_DIED,
            _ => return Classified::claimed_empty(),
        };

        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::pod(namespace, pod, ctx.node),
            Message::human(format!("{event} for pod {namespace}/{pod}"))
                .with_reason(event)
                .with_node(ctx.node),
            ctx.at(line),
        )])
    }
}
