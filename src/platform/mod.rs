// NodeSleuth - platform/mod.rs
//
// Platform layer: config.toml discovery and the filesystem-backed log source.
// Dependencies: util, core value types, the app::collect::LogSource trait.
// Must NOT depend on: app orchestration (collect/pipeline functions).

pub mod config;
pub mod source;
