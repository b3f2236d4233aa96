// NodeSleuth - core/classify/connectivity.rs
//
// Kubelet connectivity and API error classifiers: HTTP/2 connection loss,
// node lease update failures, anonymous-user rejections, cgroup cleanup
// failures, and image signature parse failures.

use super::{compile, container_locator, extract_output, Classified, LineClassifier, LineContext};
use crate::core::model::{cause, reason, EventInterval, Level, Locator, Message, Source};
use crate::util::logging::preview;
use regex::Regex;

const CONNECTION_LOST: &str = "http2: client connection lost";

/// Shared tail of the error classifiers: pull the payload out with
/// `output`, unquote it, and attach the locator `locate` builds.
///
/// Claims the line either way; a missing payload or locator yields no
/// interval.
fn common_error_interval(
    ctx: &LineContext<'_>,
    line: &str,
    output: &Regex,
    reason_code: &str,
    locate: impl FnOnce() -> Option<Locator>,
) -> Classified {
    let (Some(message), Some(locator)) = (extract_output(output, line), locate()) else {
        tracing::debug!(
            node = ctx.node,
            reason = reason_code,
            line = preview(line),
            "Error line claimed but fields missing"
        );
        return Classified::claimed_empty();
    };
    Classified::claimed(vec![EventInterval::point(
        Source::KubeletLog,
        Level::Info,
        locator,
        Message::human(message)
            .with_reason(reason_code)
            .with_node(ctx.node),
        ctx.at(line),
    )])
}

// =============================================================================
// HTTP/2 connection lost
// =============================================================================

/// How a connection-lost classifier identifies what the line is about.
enum LocatorStrategy {
    /// Container locator from the named groups of this pattern.
    Container(Regex),
    /// The node the stream came from.
    Node,
}

/// `http2: client connection lost` in one of its three kubelet contexts.
pub struct ConnectionLostClassifier {
    name: &'static str,
    context_marker: &'static str,
    output: Regex,
    locator: LocatorStrategy,
}

impl ConnectionLostClassifier {
    /// Pod status fetches: `"Failed to get status for pod" podUID=.. pod=..`.
    pub fn pod_status() -> Self {
        Self {
            name: "connection-lost-pod-status",
            context_marker: "Failed to get status for pod",
            output: compile(r#"err="(?P<OUTPUT>.+)""#),
            locator: LocatorStrategy::Container(compile(
                r#"podUID="(?P<PODUID>[a-z0-9.-]+)" pod="(?P<NS>[a-z0-9.-]+)/(?P<POD>[a-z0-9.-]+)""#,
            )),
        }
    }

    /// Reflector watches: `object-"ns"/"name": watch of ... ended with`.
    pub fn reflector() -> Self {
        Self {
            name: "connection-lost-reflector",
            context_marker: "watch of",
            output: compile(r#"error on the server \("(?P<OUTPUT>.+)"\)"#),
            locator: LocatorStrategy::Container(compile(
                r#"object-"(?P<NS>[a-z0-9.-]+)"/"(?P<POD>[a-z0-9.-]+)""#,
            )),
        }
    }

    /// Node status updates: `"Error updating node status, will retry"`.
    pub fn node_status() -> Self {
        Self {
            name: "connection-lost-node-status",
            context_marker: "Error updating node status",
            output: compile(r#"err="(?P<OUTPUT>.+)""#),
            locator: LocatorStrategy::Node,
        }
    }
}

impl LineClassifier for ConnectionLostClassifier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn wants(&self, line: &str) -> bool {
        line.contains(CONNECTION_LOST) && line.contains(self.context_marker)
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        common_error_interval(
            ctx,
            line,
            &self.output,
            reason::HTTP_CLIENT_CONNECTION_LOST,
            || match &self.locator {
                LocatorStrategy::Container(pattern) => container_locator(pattern, line),
                LocatorStrategy::Node => Some(Locator::node(ctx.node)),
            },
        )
    }
}

// =============================================================================
// Image signature
// =============================================================================

/// `StartContainer` failing with `ErrImagePull` on an unrecognised
/// signature format.
pub struct SignatureFormatClassifier {
    container_ref: Regex,
}

impl Default for SignatureFormatClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureFormatClassifier {
    pub fn new() -> Self {
        Self {
            container_ref: compile(
                r#"err=.*for \\"(?P<CONTAINER>[a-z0-9.-]+)\\".*pod="(?P<NS>[a-z0-9.-]+)/(?P<POD>[a-z0-9.-]+)" podUID="(?P<PODUID>[a-z0-9.-]+)""#,
            ),
        }
    }
}

impl LineClassifier for SignatureFormatClassifier {
    fn name(&self) -> &'static str {
        "signature-format"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("StartContainer")
            && line.contains("ErrImagePull")
            && line.contains("unrecognized signature format")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let Some(locator) = container_locator(&self.container_ref, line) else {
            return Classified::claimed_empty();
        };
        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            locator,
            Message::default()
                .with_reason(reason::ERR_IMAGE_PULL)
                .with_cause(cause::UNRECOGNIZED_SIGNATURE_FORMAT)
                .with_node(ctx.node),
            ctx.at(line),
        )])
    }
}

// =============================================================================
// Node-level failures
// =============================================================================

/// `Failed to delete cgroup paths`. Does not claim the line.
pub struct CgroupCleanupClassifier;

impl LineClassifier for CgroupCleanupClassifier {
    fn name(&self) -> &'static str {
        "cgroup-cleanup"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("Failed to delete cgroup paths")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        Classified::shared(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Error,
            Locator::node(ctx.node),
            Message::human(line).with_reason(reason::FAILED_TO_DELETE_CGROUPS_PATH),
            ctx.at(line),
        )])
    }
}

/// Requests rejected for `User "system:anonymous"`. Does not claim the line.
pub struct AnonymousUserClassifier;

impl LineClassifier for AnonymousUserClassifier {
    fn name(&self) -> &'static str {
        "anonymous-user"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains(r#"User "system:anonymous""#)
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        Classified::shared(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Error,
            Locator::node(ctx.node),
            Message::human(line).with_reason(reason::FAILED_TO_AUTHENTICATE_WITH_OPENSHIFT_USER),
            ctx.at(line),
        )])
    }
}

// =============================================================================
// Node lease
// =============================================================================

/// Kubelet gave up on the cached lease and fell back to ensuring it.
pub struct LeaseBackoffClassifier;

impl LineClassifier for LeaseBackoffClassifier {
    fn name(&self) -> &'static str {
        "lease-backoff"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("failed to update lease using latest lease, fallback to ensure lease")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::node(ctx.node),
            Message::human("detected multiple lease failures")
                .with_reason(reason::NODE_FAILED_LEASE_BACKOFF),
            ctx.at(line),
        )])
    }
}

/// Lease renewal PUT failures, in both the older `failed to update lease,
/// error:` and the structured `"Failed to update lease" err=` forms.
pub struct LeaseUpdateClassifier {
    plain: Regex,
    structured: Regex,
}

impl Default for LeaseUpdateClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseUpdateClassifier {
    pub fn new() -> Self {
        Self {
            plain: compile(
                r#"failed to update lease, error: Put "(?P<URL>[a-z0-9./:?=-]+)": (?P<MSG>[^"]+)"#,
            ),
            structured: compile(
                r#"Failed to update lease" err="Put \\"(?P<URL>[a-z0-9./:?=-]+)\\": (?P<MSG>[^"]+)"#,
            ),
        }
    }
}

impl LineClassifier for LeaseUpdateClassifier {
    fn name(&self) -> &'static str {
        "lease-update"
    }

    fn wants(&self, line: &str) -> bool {
        // Matches both "failed" and "Failed".
        line.contains("ailed to update lease")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let Some(caps) = self
            .plain
            .captures(line)
            .or_else(|| self.structured.captures(line))
        else {
            return Classified::claimed_empty();
        };
        let url = caps.name("URL").map(|m| m.as_str()).unwrap_or_default();
        let msg = caps.name("MSG").map(|m| m.as_str()).unwrap_or_default();
        if url.is_empty() && msg.is_empty() {
            return Classified::claimed_empty();
        }
        Classified::claimed(vec![EventInterval::point(
            Source::KubeletLog,
            Level::Info,
            Locator::node(ctx.node),
            Message::human(format!("{url} - {msg}")).with_reason(reason::NODE_FAILED_LEASE),
            ctx.at(line),
        )])
    }
}
