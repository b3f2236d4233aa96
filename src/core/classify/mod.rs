// NodeSleuth - core/classify/mod.rs
//
// Line classification: the `LineClassifier` capability, the ordered
// `Dispatcher` that runs a line through a fixed chain of classifiers, and
// the helpers shared by the classifier families.
//
// A classifier *claims* a line as soon as its distinguishing substring is
// present, whether or not field extraction later succeeds. The dispatcher
// stops at the first claim, so a malformed line meant for one classifier
// is never picked up by a more permissive one further down the chain.

pub mod connectivity;
pub mod crash;
pub mod probe;

use crate::core::model::{EventInterval, Locator};
use crate::core::timestamp::TimestampResolver;
use crate::util::constants;
use crate::util::logging::preview;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;

// =============================================================================
// Classifier capability
// =============================================================================

/// Per-line context handed to every classifier.
pub struct LineContext<'a> {
    /// Node the stream was fetched from.
    pub node: &'a str,
    /// Year injected into year-less journal stamps.
    pub year: i32,
    resolver: &'a TimestampResolver,
}

impl<'a> LineContext<'a> {
    pub fn new(node: &'a str, year: i32, resolver: &'a TimestampResolver) -> Self {
        Self {
            node,
            year,
            resolver,
        }
    }

    /// Event time of `line`, falling back to now when unparsable.
    pub fn at(&self, line: &str) -> DateTime<Utc> {
        self.resolver.resolve(line, self.year)
    }
}

/// What a classifier produced for one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub intervals: Vec<EventInterval>,
    /// True stops the dispatcher from offering the line to later classifiers.
    pub claimed: bool,
}

impl Classified {
    /// Exclusive result: later classifiers never see the line.
    pub fn claimed(intervals: Vec<EventInterval>) -> Self {
        Self {
            intervals,
            claimed: true,
        }
    }

    /// Claimed with nothing extracted.
    pub fn claimed_empty() -> Self {
        Self::claimed(Vec::new())
    }

    /// Non-exclusive result: the line continues down the chain.
    pub fn shared(intervals: Vec<EventInterval>) -> Self {
        Self {
            intervals,
            claimed: false,
        }
    }
}

/// A stateless line matcher.
///
/// `wants` is the cheap substring test; `parse` is only called when it
/// returns true and decides whether the line is claimed.
pub trait LineClassifier: Send + Sync {
    /// Short stable name used in debug logging.
    fn name(&self) -> &'static str;

    fn wants(&self, line: &str) -> bool;

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified;
}

// =============================================================================
// Identity filters
// =============================================================================

/// Namespace/pod predicate applied by the sync-loop classifiers.
pub type IdentityFilter = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Selects the static pods whose windows are accumulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPodSelector {
    pub namespace: String,
    /// Name prefix of the singleton pods whose readiness is tracked.
    pub probe_pod_prefix: String,
    /// Name prefix of the installer pods whose lifecycle is tracked.
    pub installer_pod_prefix: String,
}

impl Default for StaticPodSelector {
    fn default() -> Self {
        Self {
            namespace: constants::DEFAULT_STATIC_POD_NAMESPACE.to_string(),
            probe_pod_prefix: constants::DEFAULT_PROBE_POD_PREFIX.to_string(),
            installer_pod_prefix: constants::DEFAULT_INSTALLER_POD_PREFIX.to_string(),
        }
    }
}

impl StaticPodSelector {
    pub fn probe_filter(&self) -> IdentityFilter {
        prefix_filter(&self.namespace, &self.probe_pod_prefix)
    }

    pub fn installer_filter(&self) -> IdentityFilter {
        prefix_filter(&self.namespace, &self.installer_pod_prefix)
    }
}

fn prefix_filter(namespace: &str, prefix: &str) -> IdentityFilter {
    let namespace = namespace.to_string();
    let prefix = prefix.to_string();
    Arc::new(move |ns: &str, pod: &str| ns == namespace && pod.starts_with(&prefix))
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Journal units with a known classifier chain.
pub mod unit {
    pub const KUBELET: &str = "kubelet";
    pub const CRIO: &str = "crio";
    pub const OVS_VSWITCHD: &str = "ovs-vswitchd";
    pub const NETWORK_MANAGER: &str = "NetworkManager";
    pub const SYSTEMD_COREDUMP: &str = "systemd-coredump";
}

/// Runs lines through an ordered classifier chain.
pub struct Dispatcher {
    classifiers: Vec<Box<dyn LineClassifier>>,
    resolver: TimestampResolver,
}

impl Dispatcher {
    pub fn new(classifiers: Vec<Box<dyn LineClassifier>>) -> Self {
        Self {
            classifiers,
            resolver: TimestampResolver::new(),
        }
    }

    /// Chain for a journal unit, or `None` when the unit is not recognised.
    pub fn for_unit(unit_name: &str, selector: &StaticPodSelector) -> Option<Self> {
        match unit_name {
            unit::KUBELET => Some(Self::kubelet(selector)),
            unit::CRIO => Some(Self::crio()),
            unit::OVS_VSWITCHD => Some(Self::ovs_vswitchd()),
            unit::NETWORK_MANAGER => Some(Self::network_manager()),
            unit::SYSTEMD_COREDUMP => Some(Self::systemd_coredump()),
            _ => None,
        }
    }

    /// Kubelet chain. Order matters: the lease backoff classifier must run
    /// before the lease update classifier, whose claim substring it contains.
    pub fn kubelet(selector: &StaticPodSelector) -> Self {
        Self::new(vec![
            Box::new(probe::ProbeFailureClassifier::new()),
            Box::new(probe::SyncLoopProbeClassifier::new(selector.probe_filter())),
            Box::new(probe::PlegClassifier::new(selector.installer_filter())),
            Box::new(connectivity::ConnectionLostClassifier::pod_status()),
            Box::new(connectivity::ConnectionLostClassifier::reflector()),
            Box::new(connectivity::ConnectionLostClassifier::node_status()),
            Box::new(connectivity::SignatureFormatClassifier::new()),
            Box::new(connectivity::CgroupCleanupClassifier),
            Box::new(connectivity::AnonymousUserClassifier),
            Box::new(connectivity::LeaseBackoffClassifier),
            Box::new(connectivity::LeaseUpdateClassifier::new()),
            Box::new(crash::PanicClassifier::kubelet()),
        ])
    }

    pub fn crio() -> Self {
        Self::new(vec![Box::new(crash::PanicClassifier::crio())])
    }

    pub fn ovs_vswitchd() -> Self {
        Self::new(vec![Box::new(crash::LongPollClassifier::new())])
    }

    pub fn network_manager() -> Self {
        Self::new(vec![Box::new(crash::NetlinkClassifier)])
    }

    pub fn systemd_coredump() -> Self {
        Self::new(vec![Box::new(crash::CoreDumpClassifier::new())])
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    /// Classify a single line.
    pub fn classify_line(&self, node: &str, year: i32, line: &str) -> Vec<EventInterval> {
        let ctx = LineContext::new(node, year, &self.resolver);
        let mut out = Vec::new();
        for classifier in &self.classifiers {
            if !classifier.wants(line) {
                continue;
            }
            let result = classifier.parse(&ctx, line);
            tracing::trace!(
                classifier = classifier.name(),
                claimed = result.claimed,
                intervals = result.intervals.len(),
                line = preview(line),
                "Line matched"
            );
            out.extend(result.intervals);
            if result.claimed {
                break;
            }
        }
        out
    }

    /// Classify a newline-delimited blob. Invalid UTF-8 is replaced rather
    /// than rejected.
    pub fn classify_blob(&self, node: &str, year: i32, blob: &[u8]) -> Vec<EventInterval> {
        let text = String::from_utf8_lossy(blob);
        let mut out = Vec::new();
        let mut lines = 0usize;
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            lines += 1;
            out.extend(self.classify_line(node, year, line));
        }
        tracing::debug!(
            node,
            lines,
            intervals = out.len(),
            classifiers = self.classifiers.len(),
            "Blob classified"
        );
        out
    }
}

// =============================================================================
// Shared extraction helpers
// =============================================================================

/// Compile a fixed pattern. Patterns are literals in this module tree, so a
/// failure is a programming error.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("classifier: invalid regex")
}

/// Reverse journal quoting (`\"`, `\\`, `\n`, `\t`) in an extracted payload.
///
/// Returns `None` when the payload is not a valid escaped string (an
/// unescaped quote or an unknown escape); callers keep the raw payload then.
pub(crate) fn unquote(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return None,
            '\\' => match chars.next()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                _ => return None,
            },
            other => out.push(other),
        }
    }
    Some(out)
}

/// First capture of `output` in `line`, unquoted where possible.
pub(crate) fn extract_output(output: &Regex, line: &str) -> Option<String> {
    let raw = output.captures(line)?.name("OUTPUT")?.as_str();
    Some(unquote(raw).unwrap_or_else(|| raw.to_string()))
}

/// Build a container locator from whichever of `NS`, `POD`, `PODUID` and
/// `CONTAINER` groups `pattern` defines. `None` when it does not match.
pub(crate) fn container_locator(pattern: &Regex, line: &str) -> Option<Locator> {
    let caps = pattern.captures(line)?;
    let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();
    Some(Locator::container(
        group("NS"),
        group("POD"),
        group("PODUID"),
        group("CONTAINER"),
    ))
}

/// Slice of `line` from the first occurrence of `marker`, or the whole line.
pub(crate) fn tail_from<'a>(line: &'a str, marker: &str) -> &'a str {
    line.find(marker).map(|i| &line[i..]).unwrap_or(line)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{reason, Level, Message, Source};

    /// Claims on "alpha" and emits one point.
    struct Exclusive;
    /// Emits one point on "alpha" but never claims.
    struct Shared;

    fn point(ctx: &LineContext<'_>, line: &str, r: &str) -> EventInterval {
        EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::node(ctx.node),
            Message::human(line).with_reason(r),
            ctx.at(line),
        )
    }

    impl LineClassifier for Exclusive {
        fn name(&self) -> &'static str {
            "exclusive"
        }
        fn wants(&self, line: &str) -> bool {
            line.contains("alpha")
        }
        fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
            Classified::claimed(vec![point(ctx, line, "Exclusive")])
        }
    }

    impl LineClassifier for Shared {
        fn name(&self) -> &'static str {
            "shared"
        }
        fn wants(&self, line: &str) -> bool {
            line.contains("alpha")
        }
        fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
            Classified::shared(vec![point(ctx, line, "Shared")])
        }
    }

    const LINE: &str = "Jul 05 17:47:52.807876 master-0 kubenswrapper[1]: alpha";

    #[test]
    fn test_dispatcher_stops_at_first_claim() {
        let d = Dispatcher::new(vec![Box::new(Exclusive), Box::new(Shared)]);
        let out = d.classify_line("n", 2023, LINE);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reason(), "Exclusive");
    }

    #[test]
    fn test_dispatcher_accumulates_shared_results() {
        let d = Dispatcher::new(vec![Box::new(Shared), Box::new(Exclusive)]);
        let out = d.classify_line("n", 2023, LINE);
        let reasons: Vec<&str> = out.iter().map(|i| i.reason()).collect();
        assert_eq!(reasons, vec!["Shared", "Exclusive"]);
    }

    #[test]
    fn test_dispatcher_skips_unwanted_lines() {
        let d = Dispatcher::new(vec![Box::new(Exclusive)]);
        assert!(d.classify_line("n", 2023, "beta").is_empty());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let d = Dispatcher::kubelet(&StaticPodSelector::default());
        let line = r#"Jul 05 17:47:52.807876 ci-op-lxqqvl5x-d3bee-gl4hp-master-0 hyperkube[1495]: I0606 17:47:52.807876    1599 prober.go:121] "Probe failed" probeType="Readiness" pod="openshift-authentication/oauth-openshift-77f7b95df5-r4xf7" podUID="1af660b3-ac3a-4182-86eb-2f74725d8415" containerName="oauth-openshift" probeResult=failure output="Get \"https://10.129.0.12:6443/healthz\": net/http: request canceled while waiting for connection (Client.Timeout exceeded while awaiting headers)""#;
        let a = d.classify_line("master-0", 2023, line);
        let b = d.classify_line("master-0", 2023, line);
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(a[0].reason(), reason::READINESS_FAILED);
    }

    #[test]
    fn test_classify_blob_splits_lines_and_tolerates_bad_utf8() {
        let d = Dispatcher::new(vec![Box::new(Exclusive)]);
        let mut blob = Vec::new();
        blob.extend_from_slice(LINE.as_bytes());
        blob.extend_from_slice(b"\n\xff\xfe garbage\n\n");
        blob.extend_from_slice(LINE.as_bytes());
        blob.extend_from_slice(b"\r\n");
        assert_eq!(d.classify_blob("n", 2023, &blob).len(), 2);
    }

    #[test]
    fn test_for_unit_routes_known_units() {
        let s = StaticPodSelector::default();
        for u in constants::DEFAULT_UNITS {
            let d = Dispatcher::for_unit(u, &s);
            assert!(d.is_some_and(|d| !d.is_empty()), "unit {u} must route");
        }
        assert!(Dispatcher::for_unit("chronyd", &s).is_none());
    }

    #[test]
    fn test_unquote_journal_escapes() {
        assert_eq!(
            unquote(r#"Get \"https://x\": eof"#).as_deref(),
            Some(r#"Get "https://x": eof"#)
        );
        assert_eq!(unquote(r"a\\b").as_deref(), Some(r"a\b"));
        assert_eq!(unquote(r#"bare " quote"#), None);
        assert_eq!(unquote(r"trailing\"), None);
    }

    #[test]
    fn test_selector_filters() {
        let s = StaticPodSelector::default();
        let probe = s.probe_filter();
        let installer = s.installer_filter();
        assert!(probe("openshift-etcd", "etcd-master-0"));
        assert!(!probe("openshift-etcd", "installer-3-master-0"));
        assert!(!probe("openshift-kube-apiserver", "etcd-master-0"));
        assert!(installer("openshift-etcd", "installer-3-master-0"));
    }

    #[test]
    fn test_tail_from_marker() {
        assert_eq!(tail_from("a b ovs-vswitchd[1]: x", "ovs-vswitchd"), "ovs-vswitchd[1]: x");
        assert_eq!(tail_from("no marker", "ovs-vswitchd"), "no marker");
    }
}
