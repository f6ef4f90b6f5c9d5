//! WebSocket observer attachment.
//!
//! `GET /ws?topic=device_state&since=42` upgrades to a stream of hub
//! deliveries: events, overflow markers, and replay-gap markers, each as one
//! JSON text frame. Consumers track sequence numbers for gap detection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use printherd_core::{Delivery, Subscription, Topic};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Query parameters for observer attachment.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Topic to observe (`device_state`, `dashboard_stats`, `monitoring`,
    /// `generic`).
    pub topic: String,
    /// Last sequence the client saw; missed events are replayed when the
    /// buffer still holds them.
    pub since: Option<u64>,
}

fn delivery_kind(delivery: &Delivery) -> &'static str {
    match delivery {
        Delivery::Event(_) => "event",
        Delivery::Overflow { .. } => "overflow",
        Delivery::ReplayGap { .. } => "replay_gap",
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(topic) = Topic::parse(&query.topic) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unknown topic: {}", query.topic),
        )
            .into_response();
    };

    let subscription = state.hub().subscribe(topic, query.since);
    ws.on_upgrade(move |socket| handle_socket(socket, subscription))
        .into_response()
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(
        topic = subscription.topic().as_str(),
        subscriber_id = %subscription.id(),
        "WebSocket client connected"
    );

    // Forward hub deliveries to this client.
    let send_task = tokio::spawn(async move {
        while let Some(delivery) = subscription.recv().await {
            WS_MESSAGES_SENT
                .with_label_values(&[delivery_kind(&delivery)])
                .inc();

            match serde_json::to_string(&delivery) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize delivery: {}", e);
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close).
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                // We don't expect any client messages, but log them
                debug!("Received text message: {}", text);
            }
            Ok(_) => {
                // Ignore other message types
            }
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // Dropping the subscription inside the send task detaches it from the
    // hub; aborting the task triggers that drop.
    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
