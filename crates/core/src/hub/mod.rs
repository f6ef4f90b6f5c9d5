//! Event fan-out hub for real-time observers.
//!
//! The hub decouples producers (orchestrator, scheduler jobs) from consumers
//! (dashboard connections): `publish` never blocks, each subscriber owns a
//! bounded queue, and a slow consumer loses its oldest events rather than
//! stalling the producer.

mod config;
mod fanout;
mod types;

pub use config::HubConfig;
pub use fanout::{EventHub, Subscription};
pub use types::{Delivery, Event, Topic};
