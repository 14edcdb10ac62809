//! Carrier media stream (`/outbound-media-stream`)
//!
//! The carrier connects one WebSocket per live call. Frames are decoded here
//! and piped into a fresh media bridge; outbound `media`/`clear` messages
//! flow back preserving the carrier's `streamSid`. Unparseable frames are a
//! soft error: log and continue.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dialflow_engine::CarrierFrame;

use crate::AppState;

const FRAME_CHANNEL_CAPACITY: usize = 512;

pub async fn media_stream_handler(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Carrier media stream connected");
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (frames_tx, frames_rx) = mpsc::channel::<CarrierFrame>(FRAME_CHANNEL_CAPACITY);
    let (to_carrier_tx, mut to_carrier_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

    let bridge = state.bridges.spawn(frames_rx, to_carrier_tx);

    // Writer: bridge -> carrier.
    let writer = tokio::spawn(async move {
        while let Some(message) = to_carrier_rx.recv().await {
            let text = message.to_message();
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader: carrier -> bridge.
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match CarrierFrame::decode(&text) {
                Some(frame) => {
                    if frames_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                None => warn!("Unparseable media frame: {:.120}", text.as_str()),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Media socket read error: {}", e);
                break;
            }
        }
    }

    // Closing our sender lets the bridge observe the carrier side ending and
    // drain within its grace window.
    drop(frames_tx);
    match bridge.await {
        Ok(stats) => debug!(
            "Media stream closed for {} after {} transcript lines",
            stats.call_sid, stats.transcript_messages
        ),
        Err(e) => warn!("Bridge task failed: {}", e),
    }
    writer.abort();
}
