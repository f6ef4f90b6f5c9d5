//! Fan-out hub implementation.
//!
//! Shared state is limited to one short-held mutex per topic plus one per
//! subscriber queue; no lock is ever held across an await point, so `publish`
//! is safe to call from any producer task.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{EVENTS_PUBLISHED, SUBSCRIBER_OVERFLOWS, SUBSCRIPTIONS_ACTIVE};

use super::config::HubConfig;
use super::types::{Delivery, Event, Topic};

/// Per-subscriber delivery state.
struct SubscriberQueue {
    buf: VecDeque<Event>,
    /// Events dropped since the subscriber last drained; delivered as a
    /// single overflow marker ahead of the next event.
    missed: u64,
    /// Set at subscribe time when a requested replay start was already
    /// evicted from the replay buffer.
    pending_gap: Option<(u64, u64)>,
    closed: bool,
}

struct SubscriberShared {
    id: Uuid,
    topic: Topic,
    queue: Mutex<SubscriberQueue>,
    notify: Notify,
}

/// Per-topic publication state.
struct TopicState {
    next_sequence: u64,
    replay: VecDeque<Event>,
    subscribers: HashMap<Uuid, Arc<SubscriberShared>>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            next_sequence: 0,
            replay: VecDeque::new(),
            subscribers: HashMap::new(),
        }
    }
}

struct HubInner {
    config: HubConfig,
    topics: [Mutex<TopicState>; 4],
}

impl HubInner {
    fn topic(&self, topic: Topic) -> &Mutex<TopicState> {
        &self.topics[topic.index()]
    }

    /// Push an event onto one subscriber queue, dropping the oldest buffered
    /// event when the queue is full.
    fn push_to_subscriber(&self, sub: &SubscriberShared, event: Event) {
        {
            let mut q = sub.queue.lock().unwrap();
            if q.closed {
                return;
            }
            if q.buf.len() >= self.config.subscriber_capacity {
                q.buf.pop_front();
                if q.missed == 0 {
                    warn!(
                        subscriber_id = %sub.id,
                        topic = sub.topic.as_str(),
                        "subscriber queue full, dropping oldest events"
                    );
                }
                q.missed += 1;
                SUBSCRIBER_OVERFLOWS.inc();
            }
            q.buf.push_back(event);
        }
        sub.notify.notify_one();
    }

    fn remove_subscriber(&self, id: Uuid) {
        for topic in Topic::ALL {
            let removed = {
                let mut state = self.topic(topic).lock().unwrap();
                state.subscribers.remove(&id)
            };
            if let Some(sub) = removed {
                {
                    let mut q = sub.queue.lock().unwrap();
                    q.closed = true;
                }
                sub.notify.notify_one();
                SUBSCRIPTIONS_ACTIVE.dec();
                debug!(subscriber_id = %id, topic = topic.as_str(), "subscriber removed");
                return;
            }
        }
    }
}

/// The event fan-out hub.
///
/// Cheaply cloneable; all clones share the same topics and subscribers.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Create a new hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                topics: [
                    Mutex::new(TopicState::new()),
                    Mutex::new(TopicState::new()),
                    Mutex::new(TopicState::new()),
                    Mutex::new(TopicState::new()),
                ],
            }),
        }
    }

    /// Publish an event, assigning the next per-topic sequence number.
    ///
    /// Never blocks: delivery to each current subscriber is attempted with
    /// the drop-oldest overflow policy. Returns the assigned sequence.
    pub fn publish(&self, topic: Topic, payload: serde_json::Value) -> u64 {
        let mut state = self.inner.topic(topic).lock().unwrap();
        state.next_sequence += 1;
        let event = Event {
            topic,
            sequence: state.next_sequence,
            payload,
            emitted_at: Utc::now(),
        };

        state.replay.push_back(event.clone());
        if state.replay.len() > self.inner.config.replay_capacity {
            state.replay.pop_front();
        }

        for sub in state.subscribers.values() {
            self.inner.push_to_subscriber(sub, event.clone());
        }

        EVENTS_PUBLISHED.with_label_values(&[topic.as_str()]).inc();
        event.sequence
    }

    /// Attach an observer to a topic.
    ///
    /// When `since_sequence` is given and the replay buffer still holds the
    /// events after it, they are queued oldest-to-newest before live delivery
    /// begins; otherwise a replay-gap marker is delivered first.
    pub fn subscribe(&self, topic: Topic, since_sequence: Option<u64>) -> Subscription {
        let id = Uuid::new_v4();
        let sub = Arc::new(SubscriberShared {
            id,
            topic,
            queue: Mutex::new(SubscriberQueue {
                buf: VecDeque::new(),
                missed: 0,
                pending_gap: None,
                closed: false,
            }),
            notify: Notify::new(),
        });

        {
            let mut state = self.inner.topic(topic).lock().unwrap();

            if let Some(since) = since_sequence {
                let resumed_from = match state.replay.front() {
                    Some(oldest) => oldest.sequence.max(since + 1),
                    None => state.next_sequence + 1,
                };
                if resumed_from > since + 1 {
                    let mut q = sub.queue.lock().unwrap();
                    q.pending_gap = Some((since, resumed_from));
                }
                for event in state.replay.iter().filter(|e| e.sequence > since) {
                    self.inner.push_to_subscriber(&sub, event.clone());
                }
            }

            state.subscribers.insert(id, Arc::clone(&sub));
        }

        SUBSCRIPTIONS_ACTIVE.inc();
        debug!(subscriber_id = %id, topic = topic.as_str(), "subscriber attached");

        Subscription {
            id,
            topic,
            shared: sub,
            hub: Arc::clone(&self.inner),
            detached: false,
        }
    }

    /// Detach a subscriber. Idempotent; unknown ids are a no-op.
    pub fn unsubscribe(&self, id: Uuid) {
        self.inner.remove_subscriber(id);
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.topic(topic).lock().unwrap().subscribers.len()
    }

    /// Last sequence number assigned on a topic (0 if none yet).
    pub fn last_sequence(&self, topic: Topic) -> u64 {
        self.inner.topic(topic).lock().unwrap().next_sequence
    }
}

/// A live observer attached to one topic.
///
/// Dropping the subscription detaches it from the hub.
pub struct Subscription {
    id: Uuid,
    topic: Topic,
    shared: Arc<SubscriberShared>,
    hub: Arc<HubInner>,
    detached: bool,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Receive the next delivery, waiting until one is available.
    ///
    /// Returns `None` once the subscription is detached and drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if let Some(delivery) = self.pop() {
                return Some(delivery);
            }
            if self.shared.queue.lock().unwrap().closed {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.pop()
    }

    fn pop(&self) -> Option<Delivery> {
        let mut q = self.shared.queue.lock().unwrap();
        if let Some((requested, resumed_from)) = q.pending_gap.take() {
            return Some(Delivery::ReplayGap {
                topic: self.topic,
                requested,
                resumed_from,
            });
        }
        if q.missed > 0 {
            let missed = q.missed;
            q.missed = 0;
            return Some(Delivery::Overflow {
                topic: self.topic,
                missed,
            });
        }
        q.buf.pop_front().map(Delivery::Event)
    }

    /// Detach from the hub. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.detached {
            self.detached = true;
            self.hub.remove_subscriber(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
