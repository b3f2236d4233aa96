// NodeSleuth - app/mod.rs
//
// Application layer: concurrent collection and the end-to-end pipeline.
// Dependencies: core layer.
// Must NOT depend on: platform specifics.

pub mod collect;
pub mod pipeline;
