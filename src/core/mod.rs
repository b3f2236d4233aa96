// NodeSleuth - core/mod.rs
//
// Core pipeline logic: classification, window accumulation, overlap
// scoring, report checks, export.
// Must NOT depend on: app, platform, or any filesystem/network I/O.

pub mod analysis;
pub mod checks;
pub mod classify;
pub mod export;
pub mod model;
pub mod overlap;
pub mod report;
pub mod timestamp;
pub mod window;
