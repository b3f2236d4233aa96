// NodeSleuth - app/collect.rs
//
// Concurrent per-node log collection.
//
// One worker task per node fetches each configured journal unit in order and
// classifies it with that unit's dispatcher. A fetch failure stops the
// remaining units for that node only and drops that node's output; other
// nodes carry on and their intervals are still returned. Each task sends
// its finished result over an mpsc channel and the caller drains the
// channel once every task has joined, so no result buffer is shared between
// workers.

use crate::core::classify::{Dispatcher, StaticPodSelector};
use crate::core::model::EventInterval;
use crate::util::constants;
use crate::util::error::{CollectError, SourceError, StreamError};
use std::sync::mpsc;
use std::time::Instant;

// =============================================================================
// Log source capability
// =============================================================================

/// Anything that can enumerate nodes and hand back a unit's journal bytes.
///
/// Implementations are shared across collection workers, hence `Sync`.
pub trait LogSource: Sync {
    /// Node names to collect from.
    fn nodes(&self) -> Result<Vec<String>, SourceError>;

    /// Raw newline-delimited journal of `unit` on `node`.
    fn fetch(&self, node: &str, unit: &str) -> Result<Vec<u8>, SourceError>;
}

// =============================================================================
// Options and results
// =============================================================================

/// Parameters of one collection pass.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Units fetched from every node, in fetch order.
    pub units: Vec<String>,
    /// Static pods whose windows the kubelet chain keeps.
    pub selector: StaticPodSelector,
    /// Year injected into year-less journal stamps.
    pub year: i32,
    /// Worker threads (0 = one per available core).
    pub worker_threads: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        use chrono::Datelike;
        Self {
            units: constants::DEFAULT_UNITS
                .iter()
                .map(|u| u.to_string())
                .collect(),
            selector: StaticPodSelector::default(),
            year: chrono::Utc::now().year(),
            worker_threads: constants::DEFAULT_WORKER_THREADS,
        }
    }
}

/// Output of a collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    /// Intervals from every node that was read in full, grouped by node in
    /// listing order.
    pub intervals: Vec<EventInterval>,
    /// Number of nodes listed.
    pub nodes: usize,
    /// Failed streams, sorted by node then unit.
    pub failed: Vec<StreamError>,
}

impl Collection {
    /// Move the failed streams out as one aggregate error, or `None` when
    /// every stream was read.
    pub fn take_error(&mut self) -> Option<CollectError> {
        if self.failed.is_empty() {
            return None;
        }
        Some(CollectError::Aggregate {
            errors: std::mem::take(&mut self.failed),
        })
    }
}

/// What one node's worker sends back.
struct NodeResult {
    index: usize,
    intervals: Vec<EventInterval>,
    error: Option<StreamError>,
}

// =============================================================================
// Collection pass
// =============================================================================

/// Collect and classify every configured unit from every node.
///
/// Returns `CollectError::Nodes` when the node listing fails and
/// `CollectError::ThreadPool` when the worker pool cannot start. Failed
/// fetches do not fail the pass: they land in `Collection::failed` once all
/// workers have joined, and only the failing nodes' intervals are dropped.
pub fn collect<S>(source: &S, options: &CollectOptions) -> Result<Collection, CollectError>
where
    S: LogSource + ?Sized,
{
    let started = Instant::now();
    let nodes = source.nodes().map_err(CollectError::Nodes)?;

    // Dispatchers are built once and shared read-only by every worker.
    let chains: Vec<(&str, Option<Dispatcher>)> = options
        .units
        .iter()
        .map(|u| (u.as_str(), Dispatcher::for_unit(u, &options.selector)))
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.worker_threads)
        .thread_name(|i| format!("nodesleuth-collect-{i}"))
        .build()
        .map_err(|source| CollectError::ThreadPool { source })?;

    tracing::info!(
        nodes = nodes.len(),
        units = options.units.len(),
        threads = pool.current_num_threads(),
        year = options.year,
        "Collection started"
    );

    let (tx, rx) = mpsc::channel::<NodeResult>();
    pool.scope(|scope| {
        for (index, node) in nodes.iter().enumerate() {
            let tx = tx.clone();
            let chains = &chains;
            scope.spawn(move |_| {
                let (intervals, error) = collect_node(source, node, chains, options.year);
                // The receiver outlives the scope, so a send cannot fail.
                let _ = tx.send(NodeResult {
                    index,
                    intervals,
                    error,
                });
            });
        }
    });
    drop(tx);

    let mut per_node: Vec<Vec<EventInterval>> = vec![Vec::new(); nodes.len()];
    let mut errors: Vec<StreamError> = Vec::new();
    for result in rx {
        match result.error {
            Some(e) => errors.push(e),
            None => per_node[result.index] = result.intervals,
        }
    }

    if !errors.is_empty() {
        errors.sort_by(|a, b| a.node.cmp(&b.node).then_with(|| a.unit.cmp(&b.unit)));
        tracing::warn!(
            failed = errors.len(),
            nodes = nodes.len(),
            "Collection finished with failed streams"
        );
    }

    let intervals: Vec<EventInterval> = per_node.into_iter().flatten().collect();
    tracing::info!(
        nodes = nodes.len(),
        intervals = intervals.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Collection complete"
    );

    Ok(Collection {
        intervals,
        nodes: nodes.len(),
        failed: errors,
    })
}

/// Fetch and classify one node's units in order, stopping at the first
/// failed fetch.
fn collect_node<S>(
    source: &S,
    node: &str,
    chains: &[(&str, Option<Dispatcher>)],
    year: i32,
) -> (Vec<EventInterval>, Option<StreamError>)
where
    S: LogSource + ?Sized,
{
    let mut intervals = Vec::new();
    for (unit, dispatcher) in chains {
        let blob = match source.fetch(node, unit) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(
                    node,
                    unit,
                    error = %e,
                    "Stream fetch failed; skipping remaining units"
                );
                let error = StreamError {
                    node: node.to_string(),
                    unit: unit.to_string(),
                    source: e,
                };
                return (intervals, Some(error));
            }
        };

        match dispatcher {
            Some(d) => {
                let found = d.classify_blob(node, year, &blob);
                tracing::debug!(
                    node,
                    unit,
                    bytes = blob.len(),
                    intervals = found.len(),
                    "Stream classified"
                );
                intervals.extend(found);
            }
            None => {
                tracing::debug!(
                    node,
                    unit,
                    bytes = blob.len(),
                    "No classifiers for unit; stream ignored"
                );
            }
        }
    }
    (intervals, None)
}
