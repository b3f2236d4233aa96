// NodeSleuth - app/pipeline.rs
//
// End-to-end run: collect from a log source, then analyse.
//
// The analysis only starts once every collection worker has joined. A node
// listing or worker pool failure stops the run before any window is scored;
// failed streams are carried next to an analysis of the nodes that were read.

use crate::app::collect::{collect, CollectOptions, LogSource};
use crate::core::analysis::{analyze, Analysis};
use crate::core::report::ConcurrencyPolicy;
use crate::util::error::{CollectError, Result};

/// Everything a pipeline run needs besides the source.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub collect: CollectOptions,
    pub policy: ConcurrencyPolicy,
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    pub analysis: Analysis,
    /// Streams that could not be fetched. The analysis covers every other
    /// node.
    pub collection_error: Option<CollectError>,
}

/// Collect from `source` and analyse the merged intervals.
pub fn run<S>(source: &S, options: &PipelineOptions) -> Result<RunOutcome>
where
    S: LogSource + ?Sized,
{
    let mut collection = collect(source, &options.collect)?;
    let collection_error = collection.take_error();
    tracing::debug!(
        nodes = collection.nodes,
        intervals = collection.intervals.len(),
        failed_streams = collection_error.is_some(),
        policy = ?options.policy,
        "Starting analysis"
    );
    Ok(RunOutcome {
        analysis: analyze(collection.intervals, options.policy),
        collection_error,
    })
}
