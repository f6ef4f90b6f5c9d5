pub mod config;
pub mod device_client;
pub mod hub;
pub mod metrics;
pub mod orchestrator;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DeviceConfig,
    ServerConfig,
};
pub use device_client::{
    DeviceClient, DeviceClientError, DeviceEndpoint, DeviceStatus, HttpDeviceClient,
};
pub use hub::{Delivery, Event, EventHub, HubConfig, Subscription, Topic};
pub use orchestrator::{
    ConnectionSnapshot, ConnectionState, FleetOrchestrator, OrchestratorConfig, OrchestratorError,
};
pub use scheduler::{
    task_body, LastResult, SchedulerConfig, SchedulerError, TaskContext, TaskKind, TaskOutcome,
    TaskRun, TaskScheduler, TaskSnapshot, TaskSpec,
};
