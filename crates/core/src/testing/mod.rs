//! Test doubles shared by unit and integration tests.

mod mock_device_client;

pub use mock_device_client::{MockDeviceClient, RecordedPoll};
