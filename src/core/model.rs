// NodeSleuth - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// These types are the shared vocabulary across all layers: classifiers emit
// `EventInterval`s, accumulators read them, the overlap scorer renders
// windows back into them, and report checks and exporters consume them.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Instant used for an interval bound that was never observed.
///
/// A window whose `to` (or `from`) was never seen is rendered with this
/// value; an interval whose `to` equals it is still open.
pub const UNSET_INSTANT: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

// =============================================================================
// Level
// =============================================================================

/// Interval severity, ordered from most to least severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Level {
    Error,
    Warning,
    #[default]
    Info,
}

impl Level {
    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Info => "Info",
        }
    }

    /// Short label for compact display (e.g. rendered interval lines).
    pub fn short_label(&self) -> &'static str {
        match self {
            Level::Error => "E",
            Level::Warning => "W",
            Level::Info => "I",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Source
// =============================================================================

/// The log stream (or analysis) that produced an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    KubeletLog,
    CrioLog,
    OvsVswitchdLog,
    NetworkManagerLog,
    SystemdCoreDumpLog,
    /// Windows derived by the accumulators and scored by the overlap detector.
    StaticPodWindows,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::KubeletLog => "KubeletLog",
            Source::CrioLog => "CrioLog",
            Source::OvsVswitchdLog => "OVSVswitchdLog",
            Source::NetworkManagerLog => "NetworkManagerLog",
            Source::SystemdCoreDumpLog => "SystemdCoreDumpLog",
            Source::StaticPodWindows => "StaticPodWindows",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Reason codes and annotation keys
// =============================================================================

/// Reason codes carried by `Message::reason`.
pub mod reason {
    pub const READINESS_FAILED: &str = "ReadinessFailed";
    pub const READINESS_ERRORED: &str = "ReadinessErrored";
    pub const STARTUP_PROBE_FAILED: &str = "StartupProbeFailed";
    pub const PROBE_STATUS: &str = "ProbeStatus";
    pub const CONTAINER_STARTED: &str = "ContainerStarted";
    pub const CONTAINER_DIED: &str = "ContainerDied";
    pub const HTTP_CLIENT_CONNECTION_LOST: &str = "HttpClientConnectionLost";
    pub const ERR_IMAGE_PULL: &str = "ErrImagePull";
    pub const FAILED_TO_DELETE_CGROUPS_PATH: &str = "FailedToDeleteCGroupsPath";
    pub const FAILED_TO_AUTHENTICATE_WITH_OPENSHIFT_USER: &str =
        "FailedToAuthenticateWithOpenShiftUser";
    pub const NODE_FAILED_LEASE: &str = "FailedToUpdateLease";
    pub const NODE_FAILED_LEASE_BACKOFF: &str = "FailedToUpdateLeaseInBackoff";
    pub const PROCESS_DUMPED_CORE: &str = "ProcessDumpedCore";
    pub const KUBELET_PANIC: &str = "KubeletPanic";
    pub const CRIO_PANIC: &str = "CrioPanic";
    pub const UNREASONABLY_LONG_POLL_INTERVAL: &str = "UnreasonablyLongPollInterval";
    pub const TOO_MANY_NETLINK_EVENTS: &str = "TooManyNetlinkEvents";
    pub const READINESS_WINDOW: &str = "UnreadyWindow";
    pub const INSTALLER_WINDOW: &str = "InstallerWindow";
}

/// Cause codes carried by `Message::cause`.
pub mod cause {
    pub const UNRECOGNIZED_SIGNATURE_FORMAT: &str = "UnrecognizedSignatureFormat";
}

/// Annotation keys.
pub mod annotation {
    pub const REASON: &str = "reason";
    pub const CAUSE: &str = "cause";
    pub const NODE: &str = "node";
    pub const PROBE: &str = "probe";
    pub const STATUS: &str = "status";
    pub const PROCESS: &str = "process";
    pub const CONCURRENT_NODE: &str = "concurrent-node";
    pub const CONCURRENT_POD: &str = "concurrent-pod";
}

// =============================================================================
// Locator
// =============================================================================

/// Discriminator for the shape of a `Locator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    #[default]
    Unknown,
    Node,
    Pod,
    Container,
    /// A node together with the fixed role a scored window plays on it.
    NodeRole,
}

/// Locator keys.
pub mod locator_key {
    pub const NODE: &str = "node";
    pub const NAMESPACE: &str = "namespace";
    pub const POD: &str = "pod";
    pub const UID: &str = "uid";
    pub const CONTAINER: &str = "container";
    pub const ROLE: &str = "role";
}

/// Typed key/value identity attached to an interval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Locator {
    pub kind: LocatorKind,
    pub keys: BTreeMap<String, String>,
}

impl Locator {
    /// Locator for a whole node.
    pub fn node(node: &str) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(locator_key::NODE.to_string(), node.to_string());
        Self {
            kind: LocatorKind::Node,
            keys,
        }
    }

    /// Locator for a pod observed on `node`.
    pub fn pod(namespace: &str, pod: &str, node: &str) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(locator_key::NAMESPACE.to_string(), namespace.to_string());
        keys.insert(locator_key::POD.to_string(), pod.to_string());
        keys.insert(locator_key::NODE.to_string(), node.to_string());
        Self {
            kind: LocatorKind::Pod,
            keys,
        }
    }

    /// Locator for a container. `uid` is omitted when empty; `container`
    /// is always present, possibly empty when the line does not name it.
    pub fn container(namespace: &str, pod: &str, uid: &str, container: &str) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(locator_key::NAMESPACE.to_string(), namespace.to_string());
        keys.insert(locator_key::POD.to_string(), pod.to_string());
        if !uid.is_empty() {
            keys.insert(locator_key::UID.to_string(), uid.to_string());
        }
        keys.insert(locator_key::CONTAINER.to_string(), container.to_string());
        Self {
            kind: LocatorKind::Container,
            keys,
        }
    }

    /// Locator for a scored window: the node it ran on plus its role.
    pub fn node_role(node: &str, role: &str) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(locator_key::NODE.to_string(), node.to_string());
        keys.insert(locator_key::ROLE.to_string(), role.to_string());
        Self {
            kind: LocatorKind::NodeRole,
            keys,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for Locator {
    /// Renders `key/value` pairs, identity keys first, remaining keys sorted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ORDER: [&str; 6] = [
            locator_key::NAMESPACE,
            locator_key::POD,
            locator_key::UID,
            locator_key::CONTAINER,
            locator_key::NODE,
            locator_key::ROLE,
        ];
        let mut parts: Vec<String> = ORDER
            .iter()
            .filter_map(|k| self.keys.get(*k).map(|v| format!("{k}/{v}")))
            .collect();
        parts.extend(
            self.keys
                .iter()
                .filter(|(k, _)| !ORDER.contains(&k.as_str()))
                .map(|(k, v)| format!("{k}/{v}")),
        );
        f.write_str(&parts.join(" "))
    }
}

// =============================================================================
// Message
// =============================================================================

/// Human text plus machine-readable codes for an interval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub reason: String,
    pub cause: String,
    pub human: String,
    pub annotations: BTreeMap<String, String>,
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            human: text.into(),
            ..Self::default()
        }
    }

    /// Set the reason code; mirrored into the `reason` annotation.
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self.annotations
            .insert(annotation::REASON.to_string(), reason.to_string());
        self
    }

    /// Set the cause code; mirrored into the `cause` annotation.
    pub fn with_cause(mut self, cause: &str) -> Self {
        self.cause = cause.to_string();
        self.annotations
            .insert(annotation::CAUSE.to_string(), cause.to_string());
        self
    }

    /// Record the node the line was read from.
    pub fn with_node(self, node: &str) -> Self {
        self.with_annotation(annotation::NODE, node)
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .annotations
            .iter()
            .map(|(k, v)| format!("{k}/{v}"))
            .collect();
        if !self.human.is_empty() {
            parts.push(self.human.clone());
        }
        f.write_str(&parts.join(" "))
    }
}

// =============================================================================
// Event Interval
// =============================================================================

/// The atomic unit emitted by classifiers and by the overlap scorer.
///
/// Point events have `from == to`. `to == UNSET_INSTANT` means still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInterval {
    pub source: Source,
    pub level: Level,
    pub locator: Locator,
    pub message: Message,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl EventInterval {
    /// A point interval at `at`.
    pub fn point(
        source: Source,
        level: Level,
        locator: Locator,
        message: Message,
        at: DateTime<Utc>,
    ) -> Self {
        Self::span(source, level, locator, message, at, at)
    }

    pub fn span(
        source: Source,
        level: Level,
        locator: Locator,
        message: Message,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            level,
            locator,
            message,
            from,
            to,
        }
    }

    pub fn is_open(&self) -> bool {
        self.to == UNSET_INSTANT
    }

    pub fn reason(&self) -> &str {
        &self.message.reason
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.message.annotation(key)
    }

    /// True when the overlap scorer attached a concurrency annotation.
    pub fn is_concurrent(&self) -> bool {
        self.annotation(annotation::CONCURRENT_NODE).is_some()
            || self.annotation(annotation::CONCURRENT_POD).is_some()
    }
}

impl fmt::Display for EventInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {} {} {}",
            format_instant(self.from),
            format_instant(self.to),
            self.level.short_label(),
            self.locator,
            self.message
        )
    }
}

// =============================================================================
// Formatting helpers
// =============================================================================

/// RFC 3339 with microsecond precision, the resolution of journal stamps.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Compact signed duration in seconds, e.g. `12.500s` or `-3.000s`.
pub fn format_duration(d: TimeDelta) -> String {
    let millis = d.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let abs = millis.unsigned_abs();
    format!("{sign}{}.{:03}s", abs / 1_000, abs % 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_message_reason_mirrored_in_annotations() {
        let m = Message::human("x")
            .with_reason(reason::READINESS_FAILED)
            .with_node("master-0");
        assert_eq!(m.reason, "ReadinessFailed");
        assert_eq!(m.annotation(annotation::REASON), Some("ReadinessFailed"));
        assert_eq!(m.annotation(annotation::NODE), Some("master-0"));
    }

    #[test]
    fn test_container_locator_omits_empty_uid() {
        let l = Locator::container("openshift-monitoring", "prometheus-adapter", "", "");
        assert_eq!(l.kind, LocatorKind::Container);
        assert!(l.get(locator_key::UID).is_none());
        assert_eq!(l.get(locator_key::CONTAINER), Some(""));
    }

    #[test]
    fn test_locator_display_orders_identity_keys() {
        let l = Locator::container("ns", "pod-a", "uid-1", "c");
        assert_eq!(l.to_string(), "namespace/ns pod/pod-a uid/uid-1 container/c");
        assert_eq!(
            Locator::node_role("master-1", "etcd").to_string(),
            "node/master-1 role/etcd"
        );
    }

    #[test]
    fn test_point_interval_is_closed() {
        let i = EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::node("n"),
            Message::human("m"),
            t(0),
        );
        assert_eq!(i.from, i.to);
        assert!(!i.is_open());
        assert!(!i.is_concurrent());
    }

    #[test]
    fn test_unset_to_is_open() {
        let i = EventInterval::span(
            Source::StaticPodWindows,
            Level::Error,
            Locator::node_role("n", "etcd"),
            Message::default(),
            t(0),
            UNSET_INSTANT,
        );
        assert!(i.is_open());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::milliseconds(12_500)), "12.500s");
        assert_eq!(format_duration(TimeDelta::seconds(-3)), "-3.000s");
        assert_eq!(format_duration(TimeDelta::zero()), "0.000s");
    }

    #[test]
    fn test_level_ordering_most_severe_first() {
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
    }
}
