//! Fleet orchestrator implementation.
//!
//! Keeps one authoritative connection state machine per device and drives it
//! toward Connected. Each device gets its own polling loop: a slow or hung
//! device never delays polling of any other device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::device_client::{DeviceClient, DeviceClientError, DeviceEndpoint};
use crate::hub::{EventHub, Topic};
use crate::metrics;

use super::config::OrchestratorConfig;
use super::types::{
    backoff_ms, state_after_failure, ConnectionSnapshot, ConnectionState, OrchestratorError,
};

/// Mutable connection record for one device.
///
/// Only ever mutated under the slot's lock, by whichever poll is running;
/// everything else reads through `ConnectionSnapshot`.
struct ConnectionRecord {
    state: ConnectionState,
    last_success_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    backoff_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Set once the failure ceiling alert has been published, cleared on the
    /// next successful poll so a later exhaustion alerts again.
    ceiling_reported: bool,
}

struct DeviceSlot {
    device_id: String,
    endpoint: DeviceEndpoint,
    record: Mutex<ConnectionRecord>,
    /// Signalled on deregistration to stop this device's polling loop.
    stop: Notify,
}

impl DeviceSlot {
    fn snapshot(&self) -> ConnectionSnapshot {
        let record = self.record.lock().unwrap();
        ConnectionSnapshot {
            device_id: self.device_id.clone(),
            endpoint: self.endpoint.clone(),
            state: record.state,
            last_success_at: record.last_success_at,
            consecutive_failures: record.consecutive_failures,
            backoff_until: record.backoff_until,
            last_error: record.last_error.clone(),
        }
    }
}

/// The fleet orchestrator - owns every device's connection state machine.
pub struct FleetOrchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn DeviceClient>,
    hub: EventHub,

    // Runtime state
    devices: Arc<RwLock<HashMap<String, Arc<DeviceSlot>>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FleetOrchestrator {
    /// Create a new orchestrator. Devices are registered separately.
    pub fn new(config: OrchestratorConfig, client: Arc<dyn DeviceClient>, hub: EventHub) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            client,
            hub,
            devices: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the orchestrator (spawns one polling loop per device).
    ///
    /// With `poll_interval_ms = 0` no loops are spawned; devices are only
    /// polled on demand via [`poll_once`](Self::poll_once).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting fleet orchestrator");

        if self.config.poll_interval_ms > 0 {
            let devices = self.devices.read().await;
            for slot in devices.values() {
                self.spawn_polling_loop(Arc::clone(slot));
            }
        }

        info!("Fleet orchestrator started");
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping fleet orchestrator");
        let _ = self.shutdown_tx.send(());
        info!("Fleet orchestrator stopped");
    }

    /// Register a device and, if the orchestrator is running, start its
    /// polling loop.
    pub async fn register_device(
        &self,
        device_id: impl Into<String>,
        endpoint: DeviceEndpoint,
    ) -> Result<(), OrchestratorError> {
        let device_id = device_id.into();
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device_id) {
            return Err(OrchestratorError::DuplicateDevice(device_id));
        }

        let slot = Arc::new(DeviceSlot {
            device_id: device_id.clone(),
            endpoint,
            record: Mutex::new(ConnectionRecord {
                state: ConnectionState::Disconnected,
                last_success_at: None,
                consecutive_failures: 0,
                backoff_until: None,
                last_error: None,
                ceiling_reported: false,
            }),
            stop: Notify::new(),
        });
        devices.insert(device_id.clone(), Arc::clone(&slot));
        metrics::DEVICES_REGISTERED.inc();
        info!("Registered device: {}", device_id);

        if self.running.load(Ordering::SeqCst) && self.config.poll_interval_ms > 0 {
            self.spawn_polling_loop(slot);
        }

        Ok(())
    }

    /// Deregister a device, stopping its loop. No-op if the id is unknown.
    pub async fn deregister_device(&self, device_id: &str) {
        let removed = self.devices.write().await.remove(device_id);
        let Some(slot) = removed else {
            debug!("Deregister for unknown device: {}", device_id);
            return;
        };

        {
            let mut record = slot.record.lock().unwrap();
            record.state = ConnectionState::Removed;
            self.hub.publish(
                Topic::DeviceState,
                json!({
                    "device_id": slot.device_id,
                    "state": ConnectionState::Removed.as_str(),
                }),
            );
        }
        // notify_one stores a permit, so the loop sees the stop even when it
        // is currently inside a poll rather than parked on notified().
        slot.stop.notify_one();
        metrics::DEVICES_REGISTERED.dec();
        metrics::STATE_TRANSITIONS
            .with_label_values(&["removed"])
            .inc();
        info!("Deregistered device: {}", device_id);
    }

    /// Perform one status check against a device.
    ///
    /// Poll failures never surface here - they are absorbed into the state
    /// machine and reported through the DeviceState topic, so one bad device
    /// cannot abort a batch poll. Only an unknown id is an error.
    pub async fn poll_once(
        &self,
        device_id: &str,
    ) -> Result<ConnectionSnapshot, OrchestratorError> {
        let slot = self
            .devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownDevice(device_id.to_string()))?;

        Self::poll_device(&self.config, &self.client, &self.hub, &slot).await;
        Ok(slot.snapshot())
    }

    /// Poll every registered device concurrently.
    pub async fn poll_all(&self) -> Vec<ConnectionSnapshot> {
        let slots: Vec<Arc<DeviceSlot>> = {
            let devices = self.devices.read().await;
            devices.values().cloned().collect()
        };

        let polls = slots
            .iter()
            .map(|slot| Self::poll_device(&self.config, &self.client, &self.hub, slot));
        futures::future::join_all(polls).await;

        slots.iter().map(|slot| slot.snapshot()).collect()
    }

    /// Get the current immutable view of one device.
    pub async fn snapshot(&self, device_id: &str) -> Result<ConnectionSnapshot, OrchestratorError> {
        let devices = self.devices.read().await;
        devices
            .get(device_id)
            .map(|slot| slot.snapshot())
            .ok_or_else(|| OrchestratorError::UnknownDevice(device_id.to_string()))
    }

    /// Snapshot every registered device, sorted by id.
    pub async fn snapshot_all(&self) -> Vec<ConnectionSnapshot> {
        let devices = self.devices.read().await;
        let mut snapshots: Vec<ConnectionSnapshot> =
            devices.values().map(|slot| slot.snapshot()).collect();
        snapshots.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        snapshots
    }

    /// Number of registered devices.
    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Spawn the polling loop task for one device.
    fn spawn_polling_loop(&self, slot: Arc<DeviceSlot>) {
        let config = self.config.clone();
        let client = Arc::clone(&self.client);
        let hub = self.hub.clone();
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!("Polling loop started for device {}", slot.device_id);
            loop {
                let delay = Self::next_delay(&config, &slot);
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Polling loop for {} received shutdown signal", slot.device_id);
                        break;
                    }
                    _ = slot.stop.notified() => {
                        debug!("Polling loop for {} stopped (deregistered)", slot.device_id);
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        // Deregistration cancels an in-flight poll.
                        tokio::select! {
                            _ = slot.stop.notified() => {
                                debug!(
                                    "Polling loop for {} stopped mid-poll (deregistered)",
                                    slot.device_id
                                );
                                break;
                            }
                            _ = Self::poll_device(&config, &client, &hub, &slot) => {}
                        }
                    }
                }
            }
            debug!("Polling loop stopped for device {}", slot.device_id);
        });
    }

    /// Time until this device should next be polled.
    ///
    /// Errored devices wait out their backoff instead of the regular
    /// interval so an unreachable device is not hammered.
    fn next_delay(config: &OrchestratorConfig, slot: &DeviceSlot) -> Duration {
        let interval = Duration::from_millis(config.poll_interval_ms);
        let record = slot.record.lock().unwrap();
        match record.backoff_until {
            Some(until) => {
                let remaining = until
                    .signed_duration_since(Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                interval.max(remaining)
            }
            None => interval,
        }
    }

    /// Run one poll against a device and apply the result to its state
    /// machine, publishing exactly one DeviceState event.
    async fn poll_device(
        config: &OrchestratorConfig,
        client: &Arc<dyn DeviceClient>,
        hub: &EventHub,
        slot: &Arc<DeviceSlot>,
    ) {
        debug!(
            "Polling device {} via {} client",
            slot.device_id,
            client.name()
        );
        let timer = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(config.poll_timeout_ms),
            client.status(&slot.endpoint),
        )
        .await;
        let elapsed = timer.elapsed().as_secs_f64();

        match result {
            Ok(Ok(status)) => {
                metrics::POLLS_TOTAL.with_label_values(&["success"]).inc();
                metrics::POLL_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed);

                {
                    let mut record = slot.record.lock().unwrap();
                    if record.state == ConnectionState::Removed {
                        return;
                    }
                    record.state = ConnectionState::Connected;
                    record.consecutive_failures = 0;
                    record.last_success_at = Some(Utc::now());
                    record.backoff_until = None;
                    record.last_error = None;
                    record.ceiling_reported = false;

                    // Published under the record lock: the event order must
                    // match the order of the state transitions it describes.
                    hub.publish(
                        Topic::DeviceState,
                        json!({
                            "device_id": slot.device_id,
                            "state": ConnectionState::Connected.as_str(),
                            "consecutive_failures": 0,
                            "device_status": status,
                        }),
                    );
                }

                metrics::STATE_TRANSITIONS
                    .with_label_values(&["connected"])
                    .inc();
                debug!("Poll succeeded for device {}", slot.device_id);
            }
            Ok(Err(e)) => {
                metrics::POLLS_TOTAL.with_label_values(&["failure"]).inc();
                metrics::POLL_DURATION
                    .with_label_values(&["failure"])
                    .observe(elapsed);
                Self::record_failure(config, hub, slot, &e.to_string());
            }
            Err(_) => {
                metrics::POLLS_TOTAL.with_label_values(&["timeout"]).inc();
                metrics::POLL_DURATION
                    .with_label_values(&["timeout"])
                    .observe(elapsed);
                Self::record_failure(
                    config,
                    hub,
                    slot,
                    &DeviceClientError::Timeout.to_string(),
                );
            }
        }
    }

    /// Apply a failed poll to the state machine.
    fn record_failure(
        config: &OrchestratorConfig,
        hub: &EventHub,
        slot: &Arc<DeviceSlot>,
        reason: &str,
    ) {
        let (new_state, ceiling_hit, failures) = {
            let mut record = slot.record.lock().unwrap();
            if record.state == ConnectionState::Removed {
                return;
            }

            record.consecutive_failures += 1;
            record.last_error = Some(reason.to_string());
            let failures = record.consecutive_failures;
            let new_state =
                state_after_failure(record.state, failures, config.failure_ceiling);
            record.state = new_state;

            if new_state == ConnectionState::Errored {
                let delay = backoff_ms(
                    failures,
                    config.failure_ceiling,
                    config.backoff_base_ms,
                    config.backoff_growth,
                    config.backoff_max_ms,
                );
                record.backoff_until =
                    Some(Utc::now() + chrono::Duration::milliseconds(delay as i64));
            }

            let ceiling_hit = new_state == ConnectionState::Errored && !record.ceiling_reported;
            if ceiling_hit {
                record.ceiling_reported = true;
            }

            // Published under the record lock: the event order must match
            // the order of the state transitions it describes.
            hub.publish(
                Topic::DeviceState,
                json!({
                    "device_id": slot.device_id,
                    "state": new_state.as_str(),
                    "consecutive_failures": failures,
                    "reason": reason,
                    "backoff_until": record.backoff_until,
                }),
            );
            (new_state, ceiling_hit, failures)
        };

        metrics::STATE_TRANSITIONS
            .with_label_values(&[new_state.as_str()])
            .inc();

        if ceiling_hit {
            warn!(
                "Device {} reached failure ceiling after {} consecutive failures: {}",
                slot.device_id, failures, reason
            );
            hub.publish(
                Topic::Monitoring,
                json!({
                    "alert": "device_failure_ceiling",
                    "device_id": slot.device_id,
                    "consecutive_failures": failures,
                    "reason": reason,
                }),
            );
        } else {
            debug!(
                "Poll failed for device {} ({} consecutive): {}",
                slot.device_id, failures, reason
            );
        }
    }
}
