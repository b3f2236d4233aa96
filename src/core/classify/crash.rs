// NodeSleuth - core/classify/crash.rs
//
// Crash and stall classifiers for the non-kubelet units: ovs-vswitchd poll
// stalls, NetworkManager netlink overruns, systemd-coredump reports, and
// kubelet / CRI-O panic banners.

use super::{compile, tail_from, Classified, LineClassifier, LineContext};
use crate::core::model::{annotation, reason, EventInterval, Level, Locator, Message, Source};
use crate::util::logging::preview;
use chrono::TimeDelta;
use regex::Regex;

// =============================================================================
// ovs-vswitchd
// =============================================================================

/// `Unreasonably long NNNms poll interval`. The interval ends at the log
/// time and reaches back by the reported stall.
pub struct LongPollClassifier {
    millis: Regex,
}

impl Default for LongPollClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LongPollClassifier {
    pub fn new() -> Self {
        Self {
            millis: compile(r"Unreasonably long (\d+)ms poll interval"),
        }
    }
}

impl LineClassifier for LongPollClassifier {
    fn name(&self) -> &'static str {
        "long-poll"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("Unreasonably long")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let to = ctx.at(line);
        let start = self
            .millis
            .captures(line)
            .and_then(|c| c[1].parse::<i64>().ok())
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|d| to.checked_sub_signed(d));
        let from = match start {
            Some(from) => from,
            None => {
                tracing::debug!(
                    node = ctx.node,
                    line = preview(line),
                    "Poll interval duration not extractable, emitting point"
                );
                to
            }
        };

        Classified::claimed(vec![EventInterval::span(
            Source::OvsVswitchdLog,
            Level::Warning,
            Locator::node(ctx.node),
            Message::human(tail_from(line, "ovs-vswitchd"))
                .with_reason(reason::UNREASONABLY_LONG_POLL_INTERVAL),
            from,
            to,
        )])
    }
}

// =============================================================================
// NetworkManager
// =============================================================================

/// `too many netlink events. Need to resynchronize platform cache`.
pub struct NetlinkClassifier;

impl LineClassifier for NetlinkClassifier {
    fn name(&self) -> &'static str {
        "netlink"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("too many netlink events. Need to resynchronize platform cache")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        Classified::claimed(vec![EventInterval::point(
            Source::NetworkManagerLog,
            Level::Warning,
            Locator::node(ctx.node),
            Message::human(tail_from(line, "NetworkManager"))
                .with_reason(reason::TOO_MANY_NETLINK_EVENTS),
            ctx.at(line),
        )])
    }
}

// =============================================================================
// systemd-coredump
// =============================================================================

/// `Process N (name) of user U dumped core.`
pub struct CoreDumpClassifier {
    process: Regex,
}

impl Default for CoreDumpClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreDumpClassifier {
    pub fn new() -> Self {
        Self {
            process: compile(r"Process \d+ \(([^)]+)\) of user \d+ dumped core"),
        }
    }
}

impl LineClassifier for CoreDumpClassifier {
    fn name(&self) -> &'static str {
        "core-dump"
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("dumped core")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        let mut message =
            Message::human(tail_from(line, "Process")).with_reason(reason::PROCESS_DUMPED_CORE);
        if let Some(name) = self.process.captures(line).map(|c| c[1].to_string()) {
            message = message.with_annotation(annotation::PROCESS, &name);
        }

        Classified::claimed(vec![EventInterval::point(
            Source::SystemdCoreDumpLog,
            Level::Warning,
            Locator::node(ctx.node),
            message,
            ctx.at(line),
        )])
    }
}

// =============================================================================
// Panics
// =============================================================================

/// A Go `panic: ` banner in a component's journal.
pub struct PanicClassifier {
    name: &'static str,
    source: Source,
    reason: &'static str,
    human: &'static str,
}

impl PanicClassifier {
    pub fn kubelet() -> Self {
        Self {
            name: "kubelet-panic",
            source: Source::KubeletLog,
            reason: reason::KUBELET_PANIC,
            human: "kubelet panic detected, check logs for details",
        }
    }

    pub fn crio() -> Self {
        Self {
            name: "crio-panic",
            source: Source::CrioLog,
            reason: reason::CRIO_PANIC,
            human: "CRI-O panic detected, check logs for details",
        }
    }
}

impl LineClassifier for PanicClassifier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn wants(&self, line: &str) -> bool {
        line.contains("panic: ")
    }

    fn parse(&self, ctx: &LineContext<'_>, line: &str) -> Classified {
        Classified::claimed(vec![EventInterval::point(
            self.source,
            Level::Error,
            Locator::node(ctx.node),
            Message::human(self.human)
                .with_reason(self.reason)
                .with_node(ctx.node),
            ctx.at(line),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::test_support::YEAR;
    use crate::core::classify::Dispatcher;

    #[test]
    fn test_long_poll_is_backward_dated() {
        let line = "Apr 12 11:53:51.395838 ci-op-xs3rnrtc-2d4c7-4mhm7-worker-b-dwc7w ovs-vswitchd[1124]: ovs|00002|timeval(urcu4)|WARN|Unreasonably long 109127ms poll interval (0ms user, 0ms system)";
        let out = Dispatcher::ovs_vswitchd().classify_line("worker-b", YEAR, line);
        assert_eq!(out.len(), 1);
        let i = &out[0];
        assert_eq!(i.to - i.from, TimeDelta::milliseconds(109_127));
        assert_eq!(i.source, Source::OvsVswitchdLog);
        assert_eq!(i.level, Level::Warning);
        assert!(i.message.human.starts_with("ovs-vswitchd[1124]: ovs|00002"));
    }

    #[test]
    fn test_long_poll_stall_beyond_time_range_is_point() {
        let line = "Apr 12 11:53:51.395838 worker-b ovs-vswitchd[1124]: ovs|00002|timeval(urcu4)|WARN|Unreasonably long 9000000000000000000ms poll interval (0ms user, 0ms system)";
        let out = Dispatcher::ovs_vswitchd().classify_line("worker-b", YEAR, line);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].from, out[0].to);
        assert_eq!(out[0].reason(), reason::UNREASONABLY_LONG_POLL_INTERVAL);
    }

    #[test]
    fn test_long_poll_without_duration_is_point() {
        let line = "Apr 12 11:53:51.395838 w ovs-vswitchd[1124]: Unreasonably long poll";
        let out = Dispatcher::ovs_vswitchd().classify_line("w", YEAR, line);
        assert_eq!(out[0].from, out[0].to);
    }

    #[test]
    fn test_netlink_message_starts_at_unit() {
        let line = "Apr 12 11:49:49.188086 ci-op-xs3rnrtc-2d4c7-4mhm7-worker-b-dwc7w NetworkManager[1155]: <info> [1681300187.8326] platform-linux: netlink[rtnl]: read: too many netlink events. Need to resynchronize platform cache";
        let out = Dispatcher::network_manager().classify_line("testName", YEAR, line);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].message.human,
            "NetworkManager[1155]: <info> [1681300187.8326] platform-linux: netlink[rtnl]: read: too many netlink events. Need to resynchronize platform cache"
        );
        assert_eq!(out[0].locator, Locator::node("testName"));
    }

    #[test]
    fn test_core_dump_with_process_name() {
        let line = "Apr 15 14:23:12.456789 ci-op-test-worker-node-123 systemd-coredump[1234]: Process 7798 (haproxy) of user 1000680000 dumped core.";
        let out = Dispatcher::systemd_coredump().classify_line("testName", YEAR, line);
        let i = &out[0];
        assert_eq!(i.reason(), reason::PROCESS_DUMPED_CORE);
        assert_eq!(i.annotation(annotation::PROCESS), Some("haproxy"));
        assert_eq!(i.message.human, "Process 7798 (haproxy) of user 1000680000 dumped core.");
    }

    #[test]
    fn test_core_dump_without_process_name() {
        let line = "Jun 20 16:45:21.123456 test-node systemd-coredump[9999]: Process 54321 dumped core.";
        let out = Dispatcher::systemd_coredump().classify_line("test-node", YEAR, line);
        assert_eq!(out.len(), 1);
        assert!(out[0].annotation(annotation::PROCESS).is_none());
    }

    #[test]
    fn test_core_dump_ignores_unrelated_lines() {
        let line = "Apr 15 14:23:12.456789 n systemd-coredump[1234]: Some other log message.";
        assert!(Dispatcher::systemd_coredump().classify_line("n", YEAR, line).is_empty());
    }

    #[test]
    fn test_panic_banners() {
        let line = "panic: runtime error: invalid memory address or nil pointer dereference";
        let out = Dispatcher::crio().classify_line("test-node", YEAR, line);
        assert_eq!(out[0].message.human, "CRI-O panic detected, check logs for details");
        assert_eq!(out[0].level, Level::Error);

        let c = PanicClassifier::kubelet();
        assert!(c.wants(line));
        assert!(!c.wants("normal log line"));
        assert_eq!(c.human, "kubelet panic detected, check logs for details");
    }
}
