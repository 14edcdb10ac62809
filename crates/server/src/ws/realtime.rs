//! Realtime dashboard channel (`/rt`)
//!
//! Clients subscribe to topics with JSON messages; the server replays the
//! recent ring for each topic and then forwards live hub events in
//! publication order. Delivery is best-effort: a lagging client drops
//! events and re-syncs on resubscribe.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dialflow_engine::{RealtimeHub, Topic};

use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SubscribeToCalls,
    SubscribeToCall {
        #[serde(rename = "callSid")]
        call_sid: String,
    },
    SubscribeToTranscripts,
    SubscribeToCallTranscript {
        #[serde(rename = "callSid")]
        call_sid: String,
    },
}

pub async fn realtime_handler(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // All subscribed topics funnel into one per-connection channel so the
    // writer preserves per-topic order.
    let (events_tx, mut events_rx) = mpsc::channel::<serde_json::Value>(256);

    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if ws_tx.send(Message::Text(event.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut subscribed: HashSet<String> = HashSet::new();
    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let message: ClientMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unparseable realtime message: {}", e);
                continue;
            }
        };

        let topic = match message {
            ClientMessage::SubscribeToCalls => {
                // Snapshot of in-flight calls so the dashboard starts warm.
                let snapshot = serde_json::json!({
                    "type": "active_calls",
                    "data": { "callSids": state.lifecycle.active_call_sids() },
                });
                if events_tx.send(snapshot).await.is_err() {
                    break;
                }
                Topic::Calls
            }
            ClientMessage::SubscribeToCall { call_sid } => Topic::call(call_sid),
            ClientMessage::SubscribeToTranscripts => Topic::Transcripts,
            ClientMessage::SubscribeToCallTranscript { call_sid } => Topic::transcript(call_sid),
        };
        if !subscribed.insert(topic.to_string()) {
            continue;
        }
        subscribe_topic(&state.hub, topic, events_tx.clone());
    }

    drop(events_tx);
    let _ = writer.await;
    debug!("Realtime client disconnected");
}

/// Replay the ring, then forward live events until the connection goes away.
fn subscribe_topic(hub: &RealtimeHub, topic: Topic, events_tx: mpsc::Sender<serde_json::Value>) {
    let (replay, mut receiver) = hub.subscribe(&topic);
    tokio::spawn(async move {
        for event in replay {
            if events_tx.send(event.to_json()).await.is_err() {
                return;
            }
        }
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if events_tx.send(event.to_json()).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Realtime subscriber lagged {} events on {}", skipped, topic);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}
