// NodeSleuth - lib.rs
//
// Library entry point, exposing every layer for integration testing and
// programmatic use. The CLI host in `main.rs` is a thin wrapper over it.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
