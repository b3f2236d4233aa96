// NodeSleuth - platform/config.rs
//
// Platform config directory resolution and config.toml loading with
// startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::report::ConcurrencyPolicy;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for NodeSleuth configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/nodesleuth/ or %APPDATA%\NodeSleuth\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[collection]` section.
    pub collection: CollectionSection,
    /// `[windows]` section.
    pub windows: WindowsSection,
    /// `[report]` section.
    pub report: ReportSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[collection]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CollectionSection {
    /// Journal units fetched from every node, in order.
    pub units: Option<Vec<String>>,
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
    /// Year injected into year-less journal timestamps.
    pub year: Option<i32>,
}

/// `[windows]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct WindowsSection {
    pub static_pod_namespace: Option<String>,
    pub probe_pod_prefix: Option<String>,
    pub installer_pod_prefix: Option<String>,
}

/// `[report]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// "flake" or "fail".
    pub concurrency_policy: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Collection --
    pub units: Vec<String>,
    pub worker_threads: usize,
    /// `None` means the current UTC year.
    pub year: Option<i32>,

    // -- Windows --
    pub static_pod_namespace: String,
    pub probe_pod_prefix: String,
    pub installer_pod_prefix: String,

    // -- Report --
    pub concurrency_policy: ConcurrencyPolicy,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            units: constants::DEFAULT_UNITS
                .iter()
                .map(|u| u.to_string())
                .collect(),
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            year: None,
            static_pod_namespace: constants::DEFAULT_STATIC_POD_NAMESPACE.to_string(),
            probe_pod_prefix: constants::DEFAULT_PROBE_POD_PREFIX.to_string(),
            installer_pod_prefix: constants::DEFAULT_INSTALLER_POD_PREFIX.to_string(),
            concurrency_policy: ConcurrencyPolicy::default(),
            log_level: None,
        }
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first run).
/// If the file is unreadable or unparseable, returns defaults with a warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let e = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            tracing::warn!(error = %e, "Config unreadable");
            return (AppConfig::default(), vec![format!("{e}. Using defaults.")]);
        }
    };

    let (config, warnings) = parse_config(&content, config_path);
    tracing::info!(path = %config_path.display(), warnings = warnings.len(), "Loaded config.toml");
    (config, warnings)
}

/// Parse and validate config.toml content. `origin` only labels messages.
pub fn parse_config(content: &str, origin: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    let raw: RawConfig = match toml::from_str(content) {
        Ok(r) => r,
        Err(source) => {
            let e = ConfigError::TomlParse {
                path: origin.to_path_buf(),
                source,
            };
            tracing::warn!(error = %e, "Config parse failed");
            warnings.push(format!("{e}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    // Validate each field against named constants, accumulating all problems.
    let mut config = AppConfig::default();
    let mut reject = |field: &str, value: String, expected: String| {
        let e = ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value,
            expected,
        };
        warnings.push(format!("{e}. Using default."));
    };

    // -- Collection: units --
    if let Some(units) = raw.collection.units {
        let invalid = units
            .iter()
            .find(|u| u.trim().is_empty() || u.contains(['/', '\\']) || u.starts_with('.'));
        if let Some(bad) = invalid {
            reject(
                "collection.units",
                bad.clone(),
                "journal unit names without path separators".to_string(),
            );
        } else if units.is_empty() || units.len() > constants::MAX_UNITS {
            reject(
                "collection.units",
                format!("{} entries", units.len()),
                format!("1-{} entries", constants::MAX_UNITS),
            );
        } else {
            let mut deduped: Vec<String> = Vec::with_capacity(units.len());
            for u in units {
                if !deduped.contains(&u) {
                    deduped.push(u);
                }
            }
            config.units = deduped;
        }
    }

    // -- Collection: worker_threads --
    if let Some(threads) = raw.collection.worker_threads {
        if threads <= constants::MAX_WORKER_THREADS {
            config.worker_threads = threads;
        } else {
            reject(
                "collection.worker_threads",
                threads.to_string(),
                format!("0-{} (0 = auto)", constants::MAX_WORKER_THREADS),
            );
        }
    }

    // -- Collection: year --
    if let Some(year) = raw.collection.year {
        if (constants::MIN_YEAR..=constants::MAX_YEAR).contains(&year) {
            config.year = Some(year);
        } else {
            reject(
                "collection.year",
                year.to_string(),
                format!("{}-{}", constants::MIN_YEAR, constants::MAX_YEAR),
            );
        }
    }

    // -- Windows --
    if let Some(ns) = raw.windows.static_pod_namespace {
        if ns.trim().is_empty() {
            reject(
                "windows.static_pod_namespace",
                ns,
                "a non-empty namespace".to_string(),
            );
        } else {
            config.static_pod_namespace = ns.trim().to_string();
        }
    }
    if let Some(prefix) = raw.windows.probe_pod_prefix {
        if prefix.trim().is_empty() {
            reject(
                "windows.probe_pod_prefix",
                prefix,
                "a non-empty pod name prefix".to_string(),
            );
        } else {
            config.probe_pod_prefix = prefix.trim().to_string();
        }
    }
    if let Some(prefix) = raw.windows.installer_pod_prefix {
        if prefix.trim().is_empty() {
            reject(
                "windows.installer_pod_prefix",
                prefix,
                "a non-empty pod name prefix".to_string(),
            );
        } else {
            config.installer_pod_prefix = prefix.trim().to_string();
        }
    }

    // -- Report: concurrency_policy --
    if let Some(policy) = raw.report.concurrency_policy {
        match ConcurrencyPolicy::from_name(&policy) {
            Some(p) => config.concurrency_policy = p,
            None => reject(
                "report.concurrency_policy",
                policy,
                "\"flake\" or \"fail\"".to_string(),
            ),
        }
    }

    // -- Logging: level --
    if let Some(level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            reject(
                "logging.level",
                level,
                "error, warn, info, debug, trace".to_string(),
            );
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}
