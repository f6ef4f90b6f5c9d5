mod api;
mod metrics;
mod state;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use printherd_core::{
    load_config, task_body, validate_config, Config, DeviceClient, EventHub, FleetOrchestrator,
    HttpDeviceClient, TaskScheduler, TaskSpec, Topic,
};

use api::create_router;
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PRINTHERD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Configured devices: {}", config.devices.len());

    // Compute config hash so restarts with changed config are visible in the
    // event stream
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create the fan-out hub
    let hub = EventHub::new(config.hub.clone());

    hub.publish(
        Topic::Generic,
        json!({
            "event": "service_started",
            "version": VERSION,
            "config_hash": config_hash_short,
        }),
    );

    // Create the device client
    let client: Arc<dyn DeviceClient> = Arc::new(
        HttpDeviceClient::with_timeout(Duration::from_millis(config.orchestrator.poll_timeout_ms))
            .context("Failed to create device client")?,
    );

    // Create the orchestrator and scheduler
    let orchestrator = Arc::new(FleetOrchestrator::new(
        config.orchestrator.clone(),
        client,
        hub.clone(),
    ));
    let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone(), hub.clone()));

    register_builtin_tasks(&config, &scheduler, &orchestrator, &hub)
        .context("Failed to register built-in tasks")?;

    // Start the orchestrator first so devices registered by the
    // connect-devices startup task get their polling loops immediately.
    orchestrator.start().await;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    // Create app state and router
    let app_state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        Arc::clone(&scheduler),
        hub.clone(),
    ));
    let app = create_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.shutdown().await;
    orchestrator.stop().await;

    hub.publish(
        Topic::Generic,
        json!({
            "event": "service_stopped",
            "reason": "graceful_shutdown",
        }),
    );
    info!("Shutdown complete");

    Ok(())
}

/// Register the built-in fleet jobs.
///
/// - `connect-devices` (startup): registers every configured device.
/// - `dashboard-stats` (recurring): publishes a fleet rollup.
/// - `fleet-poll` (recurring): batch-polls all devices; only registered when
///   per-device polling loops are disabled (`poll_interval_ms = 0`).
fn register_builtin_tasks(
    config: &Config,
    scheduler: &Arc<TaskScheduler>,
    orchestrator: &Arc<FleetOrchestrator>,
    hub: &EventHub,
) -> Result<()> {
    {
        let orchestrator = Arc::clone(orchestrator);
        let devices = config.devices.clone();
        scheduler.register_task(
            TaskSpec::startup("connect-devices"),
            task_body(move |_ctx| {
                let orchestrator = Arc::clone(&orchestrator);
                let devices = devices.clone();
                async move {
                    for device in &devices {
                        orchestrator
                            .register_device(device.id.clone(), device.endpoint())
                            .await?;
                        info!("Registered configured device: {}", device.id);
                    }
                    Ok(())
                }
            }),
        )?;
    }

    {
        let orchestrator = Arc::clone(orchestrator);
        let hub = hub.clone();
        scheduler.register_task(
            TaskSpec::recurring("dashboard-stats", config.server.stats_interval_ms),
            task_body(move |_ctx| {
                let orchestrator = Arc::clone(&orchestrator);
                let hub = hub.clone();
                async move {
                    let snapshots = orchestrator.snapshot_all().await;
                    let mut by_state: BTreeMap<&'static str, usize> = BTreeMap::new();
                    for snapshot in &snapshots {
                        *by_state.entry(snapshot.state.as_str()).or_insert(0) += 1;
                    }
                    hub.publish(
                        Topic::DashboardStats,
                        json!({
                            "devices_total": snapshots.len(),
                            "devices_by_state": by_state,
                        }),
                    );
                    Ok(())
                }
            }),
        )?;
    }

    if config.orchestrator.poll_interval_ms == 0 {
        info!("Per-device polling loops disabled, registering fleet-poll job");
        let orchestrator = Arc::clone(orchestrator);
        scheduler.register_task(
            TaskSpec::recurring("fleet-poll", config.server.fleet_poll_interval_ms),
            task_body(move |_ctx| {
                let orchestrator = Arc::clone(&orchestrator);
                async move {
                    orchestrator.poll_all().await;
                    Ok(())
                }
            }),
        )?;
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
