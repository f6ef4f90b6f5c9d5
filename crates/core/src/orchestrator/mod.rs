//! Connection orchestrator.
//!
//! Owns one state machine per printer and keeps it converging toward
//! Connected: `Disconnected → Connecting → Connected`, with failing polls
//! degrading through `Degraded` to `Errored` and a capped exponential
//! backoff before reconnect attempts.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::FleetOrchestrator;
pub use types::{ConnectionSnapshot, ConnectionState, OrchestratorError};
