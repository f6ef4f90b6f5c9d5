//! Fan-out hub integration tests.
//!
//! Exercises the hub the way the server does: concurrent producers, slow
//! consumers, replay attachment, and gap signalling.

use std::time::{Duration, Instant};

use serde_json::json;

use printherd_core::{Delivery, EventHub, HubConfig, Topic};

#[tokio::test]
async fn test_delivered_sequences_are_increasing_without_duplicates() {
    let hub = EventHub::new(HubConfig::default());
    let mut sub = hub.subscribe(Topic::Generic, None);

    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for n in 0..200u64 {
                hub.publish(Topic::Generic, json!({"n": n}));
                if n % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut last_sequence = 0u64;
    let mut received = 0usize;
    while received < 200 {
        match sub.recv().await.expect("live subscription") {
            Delivery::Event(event) => {
                assert!(event.sequence > last_sequence, "sequence went backwards");
                last_sequence = event.sequence;
                received += 1;
            }
            other => panic!("no overflow expected here, got {:?}", other),
        }
    }
    publisher.await.unwrap();
}

#[tokio::test]
async fn test_publisher_never_blocks_on_undrained_subscriber() {
    let hub = EventHub::new(HubConfig::default());
    let mut sub = hub.subscribe(Topic::Generic, None);

    // Subscriber is never drained; 10,000 publishes must all return
    // immediately.
    let started = Instant::now();
    for n in 0..10_000u64 {
        hub.publish(Topic::Generic, json!({"n": n}));
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(hub.last_sequence(Topic::Generic), 10_000);

    // Catching up starts with a single overflow marker covering everything
    // dropped beyond the queue capacity (default 256).
    match sub.recv().await.unwrap() {
        Delivery::Overflow { missed, .. } => assert_eq!(missed, 10_000 - 256),
        other => panic!("expected overflow marker, got {:?}", other),
    }
    match sub.recv().await.unwrap() {
        Delivery::Event(event) => assert_eq!(event.sequence, 10_000 - 256 + 1),
        other => panic!("expected event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_late_subscriber_replays_missed_events() {
    let hub = EventHub::new(HubConfig::default());
    for n in 1..=20u64 {
        hub.publish(Topic::DashboardStats, json!({"n": n}));
    }

    // Observer reconnects having last seen sequence 15.
    let mut sub = hub.subscribe(Topic::DashboardStats, Some(15));
    for expected in 16..=20u64 {
        match sub.try_recv().unwrap() {
            Delivery::Event(event) => assert_eq!(event.sequence, expected),
            other => panic!("expected replayed event, got {:?}", other),
        }
    }
    assert!(sub.try_recv().is_none());

    // Live delivery continues after replay.
    hub.publish(Topic::DashboardStats, json!({"n": 21}));
    match sub.recv().await.unwrap() {
        Delivery::Event(event) => assert_eq!(event.sequence, 21),
        other => panic!("expected live event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_evicted_replay_start_is_signalled_not_hidden() {
    let hub = EventHub::new(HubConfig {
        subscriber_capacity: 256,
        replay_capacity: 8,
    });
    for n in 1..=30u64 {
        hub.publish(Topic::Generic, json!({"n": n}));
    }

    // Sequences 1..=22 are evicted; asking for 10 cannot be honoured.
    let mut sub = hub.subscribe(Topic::Generic, Some(10));
    match sub.try_recv().unwrap() {
        Delivery::ReplayGap {
            requested,
            resumed_from,
            ..
        } => {
            assert_eq!(requested, 10);
            assert_eq!(resumed_from, 23);
        }
        other => panic!("expected replay gap, got {:?}", other),
    }
    match sub.try_recv().unwrap() {
        Delivery::Event(event) => assert_eq!(event.sequence, 23),
        other => panic!("expected event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_publishers_assign_unique_sequences() {
    let hub = EventHub::new(HubConfig::default());
    let mut sub = hub.subscribe(Topic::Monitoring, None);

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..25u64 {
                hub.publish(Topic::Monitoring, json!({"worker": worker, "n": n}));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(hub.last_sequence(Topic::Monitoring), 100);
    let mut seen = std::collections::HashSet::new();
    while let Some(delivery) = sub.try_recv() {
        match delivery {
            Delivery::Event(event) => assert!(seen.insert(event.sequence)),
            other => panic!("no overflow expected, got {:?}", other),
        }
    }
    assert_eq!(seen.len(), 100);
}

#[tokio::test]
async fn test_unsubscribe_ends_delivery() {
    let hub = EventHub::new(HubConfig::default());
    let mut sub = hub.subscribe(Topic::Generic, None);
    hub.publish(Topic::Generic, json!({"n": 1}));

    sub.unsubscribe();
    assert_eq!(hub.subscriber_count(Topic::Generic), 0);

    // Buffered deliveries drain, then the stream ends.
    assert!(matches!(sub.recv().await, Some(Delivery::Event(_))));
    assert!(sub.recv().await.is_none());

    // Further publishes are not delivered to the detached subscriber.
    hub.publish(Topic::Generic, json!({"n": 2}));
    assert!(sub.try_recv().is_none());
}
