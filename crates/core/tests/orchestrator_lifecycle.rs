//! Orchestrator lifecycle integration tests.
//!
//! These tests drive devices through the connection state machine end to
//! end: registration, polling, degradation, the failure ceiling, backoff,
//! and deregistration - observing the DeviceState topic the whole way.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use printherd_core::{
    testing::MockDeviceClient, ConnectionState, Delivery, DeviceEndpoint, EventHub,
    FleetOrchestrator, HubConfig, OrchestratorConfig, OrchestratorError, Topic,
};

/// Test helper wiring a mock device client, a hub, and an orchestrator.
struct TestHarness {
    client: MockDeviceClient,
    hub: EventHub,
    orchestrator: FleetOrchestrator,
}

impl TestHarness {
    fn new(config: OrchestratorConfig) -> Self {
        let client = MockDeviceClient::new();
        let hub = EventHub::new(HubConfig::default());
        let orchestrator =
            FleetOrchestrator::new(config, Arc::new(client.clone()), hub.clone());
        Self {
            client,
            hub,
            orchestrator,
        }
    }

    /// Manual-poll harness: no background loops.
    fn manual() -> Self {
        Self::new(OrchestratorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        })
    }
}

fn event_state(delivery: &Delivery) -> String {
    match delivery {
        Delivery::Event(event) => event.payload["state"]
            .as_str()
            .expect("state field")
            .to_string(),
        other => panic!("expected event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_repeated_success_keeps_connected() {
    let harness = TestHarness::manual();
    harness.client.set_healthy("http://d1");
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();

    for _ in 0..5 {
        let snapshot = harness.orchestrator.poll_once("d1").await.unwrap();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.consecutive_failures, 0);
    }
}

#[tokio::test]
async fn test_failure_ceiling_reaches_errored_with_bounded_backoff() {
    let harness = TestHarness::manual();
    harness.client.set_failing("http://d1", "connection refused");
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();

    let mut monitoring = harness.hub.subscribe(Topic::Monitoring, None);

    // Default ceiling is 5; push well past it.
    let mut last = None;
    for _ in 0..8 {
        last = Some(harness.orchestrator.poll_once("d1").await.unwrap());
    }
    let snapshot = last.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Errored);
    assert_eq!(snapshot.consecutive_failures, 8);

    // Backoff is set and bounded by the configured maximum.
    let until = snapshot.backoff_until.expect("backoff set");
    let remaining = until.signed_duration_since(Utc::now());
    assert!(remaining <= chrono::Duration::milliseconds(300_000));

    // Exactly one exhaustion alert, at the ceiling crossing.
    let delivery = monitoring.try_recv().expect("one monitoring alert");
    match delivery {
        Delivery::Event(event) => {
            assert_eq!(event.payload["alert"], "device_failure_ceiling");
            assert_eq!(event.payload["device_id"], "d1");
        }
        other => panic!("expected event, got {:?}", other),
    }
    assert!(monitoring.try_recv().is_none());
}

#[tokio::test]
async fn test_end_to_end_one_failure_then_nine_successes() {
    let harness = TestHarness::manual();
    harness.client.fail_times("http://d1", 1, "handshake refused");

    let mut device_state = harness.hub.subscribe(Topic::DeviceState, None);
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();

    let mut states = Vec::new();
    for _ in 0..10 {
        let snapshot = harness.orchestrator.poll_once("d1").await.unwrap();
        states.push(snapshot.state);
    }

    // Snapshot sequence: Connecting, then Connected throughout.
    assert_eq!(states[0], ConnectionState::Connecting);
    for state in &states[1..] {
        assert_eq!(*state, ConnectionState::Connected);
    }
    let final_snapshot = harness.orchestrator.snapshot("d1").await.unwrap();
    assert_eq!(final_snapshot.consecutive_failures, 0);

    // Exactly 10 DeviceState events, in sequence order, matching the polls.
    let mut observed = Vec::new();
    while let Some(delivery) = device_state.try_recv() {
        observed.push(delivery);
    }
    assert_eq!(observed.len(), 10);
    for (i, delivery) in observed.iter().enumerate() {
        match delivery {
            Delivery::Event(event) => assert_eq!(event.sequence, (i + 1) as u64),
            other => panic!("expected event, got {:?}", other),
        }
    }
    assert_eq!(event_state(&observed[0]), "connecting");
    for delivery in &observed[1..] {
        assert_eq!(event_state(delivery), "connected");
    }
}

#[tokio::test]
async fn test_timeout_counts_as_poll_failure() {
    let harness = TestHarness::new(OrchestratorConfig {
        poll_interval_ms: 0,
        poll_timeout_ms: 50,
        ..Default::default()
    });
    harness.client.set_healthy("http://slow");
    harness.client.set_latency(Duration::from_millis(500));
    harness
        .orchestrator
        .register_device("slow", DeviceEndpoint::new("http://slow"))
        .await
        .unwrap();

    let snapshot = harness.orchestrator.poll_once("slow").await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert_eq!(snapshot.consecutive_failures, 1);
    assert_eq!(snapshot.last_error.as_deref(), Some("Request timeout"));
}

#[tokio::test]
async fn test_deregister_emits_removed_and_forgets_device() {
    let harness = TestHarness::manual();
    harness.client.set_healthy("http://d1");
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();

    let mut device_state = harness.hub.subscribe(Topic::DeviceState, None);
    harness.orchestrator.deregister_device("d1").await;

    assert_eq!(event_state(&device_state.try_recv().unwrap()), "removed");
    assert!(matches!(
        harness.orchestrator.snapshot("d1").await,
        Err(OrchestratorError::UnknownDevice(_))
    ));
    assert!(matches!(
        harness.orchestrator.poll_once("d1").await,
        Err(OrchestratorError::UnknownDevice(_))
    ));
}

#[tokio::test]
async fn test_background_loops_poll_each_device() {
    let harness = TestHarness::new(OrchestratorConfig {
        poll_interval_ms: 20,
        ..Default::default()
    });
    harness.client.set_healthy("http://d1");
    harness.client.set_healthy("http://d2");

    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();
    harness.orchestrator.start().await;
    // Registration after start still gets a loop.
    harness
        .orchestrator
        .register_device("d2", DeviceEndpoint::new("http://d2"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    harness.orchestrator.stop().await;

    assert!(harness.client.poll_count("http://d1") >= 3);
    assert!(harness.client.poll_count("http://d2") >= 3);

    let d1 = harness.orchestrator.snapshot("d1").await.unwrap();
    assert_eq!(d1.state, ConnectionState::Connected);
}

#[tokio::test]
async fn test_deregister_mid_poll_stops_polling_loop() {
    let harness = TestHarness::new(OrchestratorConfig {
        poll_interval_ms: 20,
        ..Default::default()
    });
    harness.client.set_healthy("http://d1");
    harness.client.set_latency(Duration::from_millis(100));
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();
    harness.orchestrator.start().await;

    // First poll starts after ~20ms and takes 100ms, so the deregistration
    // lands while the loop is inside the device call.
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.orchestrator.deregister_device("d1").await;

    let polls_at_removal = harness.client.poll_count("http://d1");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        harness.client.poll_count("http://d1"),
        polls_at_removal,
        "loop kept polling a deregistered device"
    );

    harness.orchestrator.stop().await;
}

#[tokio::test]
async fn test_concurrent_polls_publish_events_in_state_order() {
    let harness = TestHarness::manual();
    harness.client.set_failing("http://d1", "no route");
    let mut device_state = harness.hub.subscribe(Topic::DeviceState, None);
    harness
        .orchestrator
        .register_device("d1", DeviceEndpoint::new("http://d1"))
        .await
        .unwrap();

    let polls = (0..10).map(|_| harness.orchestrator.poll_once("d1"));
    futures::future::join_all(polls).await;

    // Racing polls must still publish events in the order of the state
    // mutations they describe: failure counts 1 through 10, no reordering.
    let mut failure_counts = Vec::new();
    while let Some(delivery) = device_state.try_recv() {
        match delivery {
            Delivery::Event(event) => failure_counts.push(
                event.payload["consecutive_failures"]
                    .as_u64()
                    .expect("failure count"),
            ),
            other => panic!("expected event, got {:?}", other),
        }
    }
    assert_eq!(failure_counts, (1..=10).collect::<Vec<u64>>());

    let snapshot = harness.orchestrator.snapshot("d1").await.unwrap();
    assert_eq!(snapshot.consecutive_failures, 10);
}

#[tokio::test]
async fn test_batch_poll_isolates_failing_devices() {
    let harness = TestHarness::manual();
    harness.client.set_healthy("http://good");
    harness.client.set_failing("http://bad", "no route");
    harness
        .orchestrator
        .register_device("good", DeviceEndpoint::new("http://good"))
        .await
        .unwrap();
    harness
        .orchestrator
        .register_device("bad", DeviceEndpoint::new("http://bad"))
        .await
        .unwrap();

    let snapshots = harness.orchestrator.poll_all().await;
    assert_eq!(snapshots.len(), 2);

    let good = harness.orchestrator.snapshot("good").await.unwrap();
    let bad = harness.orchestrator.snapshot("bad").await.unwrap();
    assert_eq!(good.state, ConnectionState::Connected);
    assert_eq!(bad.state, ConnectionState::Connecting);
    assert_eq!(bad.consecutive_failures, 1);
}
