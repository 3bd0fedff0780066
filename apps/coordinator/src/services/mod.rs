// [apps/coordinator/src/services/mod.rs]
//! Background daemons and per-message pipelines the kernel spins up
//! alongside the HTTP/WebSocket server.

pub mod aggregator;
pub mod crack_pipeline;
pub mod dispatcher;
pub mod reaper;
