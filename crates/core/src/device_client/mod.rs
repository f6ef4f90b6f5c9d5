//! Device protocol abstraction.
//!
//! This module provides a `DeviceClient` trait for checking the status of
//! printer controllers over their network endpoint. The orchestrator only
//! ever needs one operation from a device: "are you alive, and what are you
//! doing". Everything command-specific lives behind this seam.

mod http;
mod types;

pub use http::HttpDeviceClient;
pub use types::*;
