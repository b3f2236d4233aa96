// NodeSleuth - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Collection and analysis over a directory of journal dumps
// 4. Report printing, optional CSV/JSON export, and the exit code

use clap::Parser;
use nodesleuth::app::collect::CollectOptions;
use nodesleuth::app::pipeline::{self, PipelineOptions};
use nodesleuth::core::analysis::Analysis;
use nodesleuth::core::classify::StaticPodSelector;
use nodesleuth::core::export;
use nodesleuth::core::report::has_blocking_failure;
use nodesleuth::platform::config::{load_config, AppConfig, PlatformPaths};
use nodesleuth::platform::source::DirectorySource;
use nodesleuth::util::constants::{MAX_YEAR, MIN_YEAR};
use nodesleuth::util::error::{ExportError, NodeSleuthError};
use nodesleuth::util::{constants, logging};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit code when some check failed without a passing companion.
const EXIT_BLOCKING_FAILURE: u8 = 1;
/// Exit code when collection failed or some stream could not be fetched.
const EXIT_COLLECTION_FAILED: u8 = 2;
/// Exit code when an export could not be written.
const EXIT_EXPORT_FAILED: u8 = 3;

/// NodeSleuth - node journal analyser.
///
/// Reads `<DIR>/<node>/<unit>.log` journal dumps, classifies known kubelet
/// and node daemon events, flags static pod windows that ran concurrently on
/// different nodes, and prints one line per report check.
#[derive(Parser, Debug)]
#[command(name = "nodesleuth", version, about)]
struct Cli {
    /// Directory holding one subdirectory of journal dumps per node.
    dir: PathBuf,

    /// config.toml to use instead of the platform default.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Year injected into journal timestamps (default: config, then current year).
    #[arg(
        short = 'y',
        long = "year",
        value_parser = clap::value_parser!(i32).range(MIN_YEAR as i64..=MAX_YEAR as i64)
    )]
    year: Option<i32>,

    /// Write raw and scored intervals plus report records as JSON.
    #[arg(long = "json")]
    json: Option<PathBuf>,

    /// Write raw and scored intervals as CSV.
    #[arg(long = "csv")]
    csv: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());
    let (config, config_warnings) = load_config(&config_path);

    logging::init(cli.debug, config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        dir = %cli.dir.display(),
        "NodeSleuth starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let options = pipeline_options(&config, cli.year);
    let source = DirectorySource::new(&cli.dir);
    let outcome = match pipeline::run(&source, &options) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %e, "Collection failed");
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_COLLECTION_FAILED);
        }
    };
    let analysis = &outcome.analysis;

    for record in &analysis.reports {
        println!("{record}");
    }

    if let Err(e) = write_exports(&cli, analysis) {
        let e = NodeSleuthError::from(e);
        tracing::error!(error = %e, "Export failed");
        eprintln!("Error: {e}");
        return ExitCode::from(EXIT_EXPORT_FAILED);
    }

    // Reports above cover the nodes that were read; the run still fails.
    if let Some(e) = outcome.collection_error {
        let e = NodeSleuthError::from(e);
        tracing::error!(error = %e, "Collection incomplete");
        eprintln!("Error: {e}");
        return ExitCode::from(EXIT_COLLECTION_FAILED);
    }

    if has_blocking_failure(&analysis.reports) {
        return ExitCode::from(EXIT_BLOCKING_FAILURE);
    }
    ExitCode::SUCCESS
}

/// Fold config and CLI overrides into pipeline options.
/// Priority for the year: CLI > config > current UTC year.
fn pipeline_options(config: &AppConfig, cli_year: Option<i32>) -> PipelineOptions {
    let defaults = CollectOptions::default();
    PipelineOptions {
        collect: CollectOptions {
            units: config.units.clone(),
            selector: StaticPodSelector {
                namespace: config.static_pod_namespace.clone(),
                probe_pod_prefix: config.probe_pod_prefix.clone(),
                installer_pod_prefix: config.installer_pod_prefix.clone(),
            },
            year: cli_year.or(config.year).unwrap_or(defaults.year),
            worker_threads: config.worker_threads,
        },
        policy: config.concurrency_policy,
    }
}

fn write_exports(cli: &Cli, analysis: &Analysis) -> Result<(), ExportError> {
    if cli.csv.is_none() && cli.json.is_none() {
        return Ok(());
    }

    let mut all = analysis.intervals.clone();
    all.extend(analysis.scored());

    if let Some(ref path) = cli.csv {
        let count = export::export_csv(&all, create(path)?, path)?;
        tracing::info!(path = %path.display(), intervals = count, "CSV written");
    }
    if let Some(ref path) = cli.json {
        let count = export::export_json(&all, &analysis.reports, create(path)?, path)?;
        tracing::info!(path = %path.display(), intervals = count, "JSON written");
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, ExportError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
}
