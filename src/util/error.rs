// NodeSleuth - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.
//
// Only collection (retrieval) errors are ever surfaced as failures to the
// caller; parse errors are recovered where they happen and reported through
// tracing, so they never reach `NodeSleuthError`.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all NodeSleuth operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum NodeSleuthError {
    /// A log source could not list nodes or deliver a stream.
    Source(SourceError),

    /// The concurrent collection pass failed.
    Collect(CollectError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Export operation failed.
    Export(ExportError),
}

impl fmt::Display for NodeSleuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "Log source error: {e}"),
            Self::Collect(e) => write!(f, "Collection error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
        }
    }
}

impl std::error::Error for NodeSleuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Collect(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors related to interpreting a single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not start with a `Mon DD HH:MM:SS` token group.
    MissingTimestamp { line: String },

    /// The timestamp tokens were found but could not be parsed.
    Timestamp { raw: String, reason: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTimestamp { line } => {
                write!(f, "no journal timestamp prefix in '{line}'")
            }
            Self::Timestamp { raw, reason } => {
                write!(f, "cannot parse timestamp '{raw}': {reason}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors raised by a `LogSource` while listing nodes or fetching a stream.
#[derive(Debug)]
pub enum SourceError {
    /// The node inventory could not be read.
    NodeListing { root: PathBuf, source: io::Error },

    /// Walking the source directory failed.
    Traversal {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// The requested node is not known to the source.
    UnknownNode { node: String },

    /// Reading a unit's journal failed.
    Io {
        node: String,
        unit: String,
        path: PathBuf,
        source: io::Error,
    },

    /// The transport refused or dropped the request.
    Unavailable {
        node: String,
        unit: String,
        reason: String,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeListing { root, source } => {
                write!(f, "cannot list nodes under '{}': {source}", root.display())
            }
            Self::Traversal { path, source } => {
                write!(f, "error traversing '{}': {source}", path.display())
            }
            Self::UnknownNode { node } => write!(f, "unknown node '{node}'"),
            Self::Io {
                node,
                unit,
                path,
                source,
            } => write!(
                f,
                "cannot read {unit} journal for node {node} from '{}': {source}",
                path.display()
            ),
            Self::Unavailable { node, unit, reason } => {
                write!(f, "{unit} journal for node {node} unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NodeListing { source, .. } => Some(source),
            Self::Traversal { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SourceError> for NodeSleuthError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Collection errors
// ---------------------------------------------------------------------------

/// A single failed fetch inside a collection pass.
#[derive(Debug)]
pub struct StreamError {
    pub node: String,
    pub unit: String,
    pub source: SourceError,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} unit {}: {}", self.node, self.unit, self.source)
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors related to the concurrent per-node collection pass.
#[derive(Debug)]
pub enum CollectError {
    /// The node inventory could not be obtained; nothing was fetched.
    Nodes(SourceError),

    /// The worker pool could not be created.
    ThreadPool { source: rayon::ThreadPoolBuildError },

    /// One or more node streams failed. Other nodes were still collected
    /// and analysed.
    Aggregate { errors: Vec<StreamError> },
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(e) => write!(f, "cannot list nodes: {e}"),
            Self::ThreadPool { source } => {
                write!(f, "cannot build collection worker pool: {source}")
            }
            Self::Aggregate { errors } => {
                if errors.len() == 1 {
                    return write!(f, "{}", errors[0]);
                }
                write!(f, "[")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Nodes(e) => Some(e),
            Self::ThreadPool { source } => Some(source),
            Self::Aggregate { errors } => errors
                .first()
                .map(|e| e as &(dyn std::error::Error + 'static)),
        }
    }
}

impl From<CollectError> for NodeSleuthError {
    fn from(e: CollectError) -> Self {
        Self::Collect(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for NodeSleuthError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for NodeSleuthError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// Convenience type alias for NodeSleuth results.
pub type Result<T> = std::result::Result<T, NodeSleuthError>;
