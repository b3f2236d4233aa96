// NodeSleuth - tests/e2e_pipeline.rs
//
// End-to-end tests for the collection and analysis pipeline.
//
// These tests write real journal dumps into a temporary directory and drive
// the public API from the directory source through classification, window
// scoring, report checks and export. No mocks.

use nodesleuth::app::collect::CollectOptions;
use nodesleuth::app::pipeline::{run, PipelineOptions};
use nodesleuth::core::analysis::{Analysis, INSTALLER_CONCURRENCY_CHECK, PROBE_CONCURRENCY_CHECK};
use nodesleuth::core::checks;
use nodesleuth::core::export::{export_csv, export_json};
use nodesleuth::core::model::{annotation, locator_key, reason, Level};
use nodesleuth::core::report::{has_blocking_failure, ConcurrencyPolicy, Verdict};
use nodesleuth::platform::config::parse_config;
use nodesleuth::platform::source::DirectorySource;
use nodesleuth::util::error::{CollectError, NodeSleuthError};
use std::fs;
use std::path::Path;

// =============================================================================
// Helpers
// =============================================================================

const YEAR: i32 = 2023;

/// Write `<root>/<node>/<unit>.log`.
fn write_journal(root: &Path, node: &str, unit: &str, lines: &[String]) {
    let dir = root.join(node);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{unit}.log")), lines.join("\n") + "\n").unwrap();
}

fn pleg(node: &str, pod: &str, event: &str, time: &str) -> String {
    format!(
        r#"Jul 05 {time}.000000 {node} kubenswrapper[2]: I0705 {time}.000000 2 kubelet.go:2453] "SyncLoop (PLEG): event for pod" pod="openshift-etcd/{pod}" event={{"ID":"5d3f-a1","Type":"{event}","Data":"abc123"}}"#
    )
}

fn readiness(node: &str, status: &str, time: &str) -> String {
    format!(
        r#"Jul 05 {time}.000000 {node} kubenswrapper[2]: I0705 {time}.000000 2 kubelet.go:2542] "SyncLoop (probe)" probe="readiness" status="{status}" pod="openshift-etcd/etcd-{node}""#
    )
}

fn options(policy: ConcurrencyPolicy) -> PipelineOptions {
    PipelineOptions {
        collect: CollectOptions {
            year: YEAR,
            worker_threads: 2,
            ..CollectOptions::default()
        },
        policy,
    }
}

/// Run the pipeline over `root`, expecting every stream to be readable.
fn analyse(root: &Path, policy: ConcurrencyPolicy) -> Analysis {
    let out = run(&DirectorySource::new(root), &options(policy)).unwrap();
    assert!(out.collection_error.is_none(), "{:?}", out.collection_error);
    out.analysis
}

fn verdicts(a: &Analysis, name: &str) -> Vec<Verdict> {
    a.reports
        .iter()
        .filter(|r| r.name == name)
        .map(|r| r.verdict)
        .collect()
}

// =============================================================================
// Window concurrency
// =============================================================================

/// Sequential installers on one node never overlap.
#[test]
fn e2e_sequential_installers_same_node_pass() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "master-0",
        "kubelet",
        &[
            pleg("master-0", "installer-3-master-0", "ContainerStarted", "10:00:00"),
            pleg("master-0", "installer-3-master-0", "ContainerDied", "10:00:30"),
            pleg("master-0", "installer-4-master-0", "ContainerStarted", "10:01:00"),
            pleg("master-0", "installer-4-master-0", "ContainerDied", "10:01:30"),
        ],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    assert_eq!(a.installer_windows.len(), 2);
    assert!(a.installer_windows.iter().all(|w| w.level == Level::Info));
    assert!(a.installer_windows.iter().all(|w| !w.is_concurrent()));
    assert_eq!(verdicts(&a, INSTALLER_CONCURRENCY_CHECK), vec![Verdict::Pass]);
    assert!(!has_blocking_failure(&a.reports));
}

/// Overlapping installers on different nodes flag the earlier one only.
#[test]
fn e2e_overlapping_installers_across_nodes_flake() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "master-0",
        "kubelet",
        &[
            pleg("master-0", "installer-7-master-0", "ContainerStarted", "10:00:00"),
            pleg("master-0", "installer-7-master-0", "ContainerDied", "10:00:40"),
        ],
    );
    write_journal(
        dir.path(),
        "master-1",
        "kubelet",
        &[
            pleg("master-1", "installer-7-master-1", "ContainerStarted", "10:00:10"),
            pleg("master-1", "installer-7-master-1", "ContainerDied", "10:00:50"),
        ],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    let flagged: Vec<_> = a.installer_windows.iter().filter(|w| w.is_concurrent()).collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].level, Level::Error);
    assert_eq!(flagged[0].annotation(annotation::CONCURRENT_NODE), Some("master-1"));
    assert_eq!(
        flagged[0].annotation(annotation::CONCURRENT_POD),
        Some("installer-7-master-1")
    );
    assert_eq!(
        verdicts(&a, INSTALLER_CONCURRENCY_CHECK),
        vec![Verdict::Fail, Verdict::Pass]
    );
    assert!(!has_blocking_failure(&a.reports));
}

/// Readiness windows follow the earliest-unready / earliest-ready rule and a
/// node that never becomes ready again stays an incomplete Error window.
#[test]
fn e2e_readiness_windows_and_unfinished_episode() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "master-0",
        "kubelet",
        &[
            readiness("master-0", "", "10:00:00"),
            readiness("master-0", "", "10:00:05"),
            readiness("master-0", "ready", "10:00:20"),
            readiness("master-0", "ready", "10:00:25"),
        ],
    );
    write_journal(
        dir.path(),
        "master-2",
        "kubelet",
        &[readiness("master-2", "", "11:00:00")],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    assert_eq!(a.probe_windows.len(), 2);
    let complete = &a.probe_windows[0];
    assert_eq!(complete.level, Level::Info);
    assert_eq!((complete.to - complete.from).num_seconds(), 20);
    assert_eq!(a.probe_windows[1].level, Level::Error);
    assert_eq!(verdicts(&a, PROBE_CONCURRENCY_CHECK), vec![Verdict::Pass]);
}

/// With `concurrency_policy = "fail"` an overlap blocks.
#[test]
fn e2e_fail_policy_from_config_blocks() {
    let dir = tempfile::tempdir().unwrap();
    for (node, start, end) in [
        ("master-0", "10:00:00", "10:00:30"),
        ("master-1", "10:00:10", "10:00:40"),
    ] {
        write_journal(
            dir.path(),
            node,
            "kubelet",
            &[readiness(node, "", start), readiness(node, "ready", end)],
        );
    }
    let (config, warnings) = parse_config(
        "[report]\nconcurrency_policy = \"fail\"\n",
        Path::new("config.toml"),
    );
    assert!(warnings.is_empty());

    let a = analyse(dir.path(), config.concurrency_policy);
    assert_eq!(verdicts(&a, PROBE_CONCURRENCY_CHECK), vec![Verdict::Fail]);
    assert!(has_blocking_failure(&a.reports));
}

/// A run where nothing was classified skips the window checks.
#[test]
fn e2e_empty_journals_skip_window_checks() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "master-0",
        "kubelet",
        &["Jul 05 10:00:00.000000 master-0 kubenswrapper[2]: nothing to see".to_string()],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    assert!(a.intervals.is_empty());
    assert_eq!(verdicts(&a, INSTALLER_CONCURRENCY_CHECK), vec![Verdict::Skip]);
    assert_eq!(verdicts(&a, PROBE_CONCURRENCY_CHECK), vec![Verdict::Skip]);
    assert!(!has_blocking_failure(&a.reports));
}

// =============================================================================
// Per-unit checks
// =============================================================================

/// Daemon journals other than kubelet are routed to their own classifiers.
#[test]
fn e2e_node_daemon_units_feed_checks() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "worker-a",
        "crio",
        &["Jul 05 10:00:00.000000 worker-a crio[900]: panic: runtime error: invalid memory address or nil pointer dereference".to_string()],
    );
    write_journal(
        dir.path(),
        "worker-a",
        "systemd-coredump",
        &["Jul 05 10:00:01.000000 worker-a systemd-coredump[1234]: Process 7798 (haproxy) of user 1000680000 dumped core.".to_string()],
    );
    write_journal(
        dir.path(),
        "worker-a",
        "ovs-vswitchd",
        &["Jul 05 10:00:02.395838 worker-a ovs-vswitchd[1124]: ovs|00002|timeval(urcu4)|WARN|Unreasonably long 1500ms poll interval (0ms user, 0ms system)".to_string()],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    // The poll stall is dated back 1.5s from its log time.
    let reasons: Vec<&str> = a.intervals.iter().map(|i| i.reason()).collect();
    assert_eq!(
        reasons,
        vec![
            reason::CRIO_PANIC,
            reason::UNREASONABLY_LONG_POLL_INTERVAL,
            reason::PROCESS_DUMPED_CORE
        ]
    );
    assert_eq!(verdicts(&a, checks::CRIO_PANIC), vec![Verdict::Fail]);
    assert_eq!(verdicts(&a, checks::CORE_DUMP), vec![Verdict::Fail, Verdict::Pass]);
    assert!(has_blocking_failure(&a.reports));
}

/// Kubelet lease failures inside the bootstrap grace period are tolerated.
#[test]
fn e2e_early_lease_failure_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(
        dir.path(),
        "master-2",
        "kubelet",
        &[r#"Jul 05 10:00:00.753983 master-2 kubenswrapper[1516]: E0705 10:00:00.753942    1516 controller.go:189] failed to update lease, error: Put "https://api-int.example.com:6443/apis/coordination.k8s.io/v1/namespaces/kube-node-lease/leases/master-2?timeout=10s": net/http: request canceled (Client.Timeout exceeded while awaiting headers)"#.to_string()],
    );

    let a = analyse(dir.path(), ConcurrencyPolicy::Flake);
    assert_eq!(a.intervals.len(), 1);
    assert_eq!(a.intervals[0].reason(), reason::NODE_FAILED_LEASE);
    assert_eq!(verdicts(&a, checks::LATE_LEASE_UPDATE), vec![Verdict::Pass]);
}

// =============================================================================
// Failure handling and export
// =============================================================================

/// A missing root is a collection failure, not an empty report.
#[test]
fn e2e_missing_root_fails_collection() {
    let dir = tempfile::tempdir().unwrap();
    let source = DirectorySource::new(dir.path().join("nope"));
    assert!(matches!(
        run(&source, &options(ConcurrencyPolicy::Flake)),
        Err(NodeSleuthError::Collect(CollectError::Nodes(_)))
    ));
}

/// An unreadable dump drops that node's output and names the stream, while
/// the other nodes are still analysed.
#[test]
fn e2e_unreadable_dump_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(dir.path(), "master-0", "kubelet", &[readiness("master-0", "", "10:00:00")]);
    write_journal(dir.path(), "master-1", "kubelet", &[readiness("master-1", "", "10:00:05")]);
    fs::create_dir_all(dir.path().join("master-1").join("crio.log")).unwrap();

    let source = DirectorySource::new(dir.path());
    let out = run(&source, &options(ConcurrencyPolicy::Flake)).unwrap();

    let nodes: Vec<&str> = out
        .analysis
        .probe_windows
        .iter()
        .map(|w| w.locator.get(locator_key::NODE).unwrap_or_default())
        .collect();
    assert_eq!(nodes, vec!["master-0"]);
    assert_eq!(out.analysis.probe_windows[0].level, Level::Error);

    match out.collection_error {
        Some(CollectError::Aggregate { errors }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].node, "master-1");
            assert_eq!(errors[0].unit, "crio");
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
}

/// Exports carry raw and scored intervals.
#[test]
fn e2e_export_round_trip_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    write_journal(
        &logs,
        "master-0",
        "kubelet",
        &[
            pleg("master-0", "installer-3-master-0", "ContainerStarted", "10:00:00"),
            pleg("master-0", "installer-3-master-0", "ContainerDied", "10:00:30"),
        ],
    );
    let a = analyse(&logs, ConcurrencyPolicy::Flake);
    let mut all = a.intervals.clone();
    all.extend(a.scored());

    let csv_path = dir.path().join("out.csv");
    let written = export_csv(&all, fs::File::create(&csv_path).unwrap(), &csv_path).unwrap();
    assert_eq!(written, 3);
    let csv = fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("StaticPodWindows"));

    let json_path = dir.path().join("out.json");
    export_json(&all, &a.reports, fs::File::create(&json_path).unwrap(), &json_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["intervals"].as_array().unwrap().len(), 3);
    assert!(!value["reports"].as_array().unwrap().is_empty());
}
