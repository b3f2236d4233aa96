// NodeSleuth - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every tunable that config.toml can override has its default and its
// accepted range defined here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "NodeSleuth";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "NodeSleuth";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Collection
// =============================================================================

/// Journal units fetched from every node when config.toml does not override
/// the list. Order matters: a fetch failure stops the remaining units for
/// that node.
pub const DEFAULT_UNITS: &[&str] = &[
    "kubelet",
    "crio",
    "ovs-vswitchd",
    "NetworkManager",
    "systemd-coredump",
];

/// Maximum number of units that may be configured per node.
pub const MAX_UNITS: usize = 16;

/// Default number of collection worker threads.
/// 0 means auto-detect (use available CPU cores).
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Hard upper bound on collection worker threads.
pub const MAX_WORKER_THREADS: usize = 256;

/// File extension of per-unit journal dumps in a directory-backed source.
pub const UNIT_LOG_EXTENSION: &str = "log";

/// Earliest year accepted as a resolver override.
pub const MIN_YEAR: i32 = 1970;

/// Latest year accepted as a resolver override.
pub const MAX_YEAR: i32 = 9_999;

// =============================================================================
// Static pod windows
// =============================================================================

/// Namespace whose static pod readiness and installer lifecycles are tracked.
pub const DEFAULT_STATIC_POD_NAMESPACE: &str = "openshift-etcd";

/// Name prefix of the singleton static pods whose readiness is tracked.
pub const DEFAULT_PROBE_POD_PREFIX: &str = "etcd-";

/// Name prefix of the installer pods whose start/die lifecycle is tracked.
pub const DEFAULT_INSTALLER_POD_PREFIX: &str = "installer-";

/// Role name placed on the locator of scored readiness windows.
pub const PROBE_WINDOW_ROLE: &str = "etcd";

/// Role name placed on the locator of scored installer windows.
pub const LIFECYCLE_WINDOW_ROLE: &str = "installer";

// =============================================================================
// Report checks
// =============================================================================

/// Lease update failures earlier than this many minutes after the first
/// observed interval are tolerated.
pub const LEASE_UPDATE_GRACE_MINUTES: i64 = 30;

/// Two lease backoff intervals on the same node closer than this many
/// seconds form a cluster worth reporting.
pub const LEASE_BACKOFF_CLUSTER_SECS: i64 = 33;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
