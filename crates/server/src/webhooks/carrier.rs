//! Carrier status webhook

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Form;
use tracing::{info, instrument, warn};

use dialflow_engine::{HubEvent, Topic};
use dialflow_store::recordings::NewRecording;
use dialflow_telephony::StatusCallback;

use crate::AppState;

/// Handle one carrier status callback.
///
/// Always answers 200: the carrier retries on errors and a replayed
/// callback converges through the idempotent upsert path anyway.
#[instrument(
    name = "carrier_status",
    skip(state, params),
    fields(
        call_sid = %params.call_sid,
        call_status = %params.call_status,
    )
)]
pub async fn carrier_status_handler(
    State(state): State<AppState>,
    Form(params): Form<StatusCallback>,
) -> impl IntoResponse {
    info!("Carrier status callback");

    if let Some(recording_sid) = params.recording_sid.clone() {
        record_recording(&state, &params, recording_sid).await;
    }

    state.lifecycle.carrier_status(&params).await;
    (StatusCode::OK, "Webhook received")
}

/// Recordings are created lazily when the carrier notifies.
async fn record_recording(state: &AppState, params: &StatusCallback, recording_sid: String) {
    let new_recording = NewRecording {
        recording_sid: recording_sid.clone(),
        call_sid: params.call_sid.clone(),
        status: params
            .recording_status
            .clone()
            .unwrap_or_else(|| "completed".to_string()),
        url: params.recording_url.clone(),
        duration_secs: params.recording_duration_secs(),
        channels: params.recording_channels(),
    };

    match state.store.upsert_recording(&new_recording).await {
        Ok(recording) => {
            let event = HubEvent::new(
                "recording_update",
                serde_json::to_value(&recording).unwrap_or_default(),
            );
            state.hub.publish(&Topic::Calls, event.clone());
            state.hub.publish(&Topic::call(&params.call_sid), event);
        }
        Err(e) => warn!("Failed to record recording {}: {}", recording_sid, e),
    }
}
