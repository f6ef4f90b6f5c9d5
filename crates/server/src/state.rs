use std::sync::Arc;

use chrono::{DateTime, Utc};
use printherd_core::{Config, EventHub, FleetOrchestrator, TaskScheduler};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<FleetOrchestrator>,
    scheduler: Arc<TaskScheduler>,
    hub: EventHub,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<FleetOrchestrator>,
        scheduler: Arc<TaskScheduler>,
        hub: EventHub,
    ) -> Self {
        Self {
            config,
            orchestrator,
            scheduler,
            hub,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &FleetOrchestrator {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
