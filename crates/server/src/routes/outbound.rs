//! Ad-hoc outbound call endpoint

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

use dialflow_engine::StartCallRequest;

use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    pub to: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub first_message: String,
    pub name: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub recording: Option<bool>,
    #[serde(rename = "callerId")]
    pub caller_id: Option<String>,
}

/// Start a single ad-hoc call outside any campaign.
pub async fn outbound_call(
    State(state): State<AppState>,
    Json(request): Json<OutboundCallRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.to.trim().is_empty() {
        return Err(ApiError::validation("'to' is required"));
    }
    let from = request
        .caller_id
        .clone()
        .unwrap_or_else(|| state.config.default_caller_id.clone());
    if from.trim().is_empty() {
        return Err(ApiError::validation("no caller id configured"));
    }

    let total_started = Instant::now();
    let mut start = StartCallRequest::new(request.to.clone(), from);
    start.prompt = request.prompt;
    start.first_message = request.first_message;
    start.region = request.region.or_else(|| state.config.region.clone());
    start.record = request.recording.unwrap_or(true);
    if let Some(name) = request.name {
        start.dynamic_variables.push(("contactName".to_string(), name));
    }

    let dial_started = Instant::now();
    let call_sid = state.lifecycle.start_call(start).await?;
    let dial_ms = dial_started.elapsed().as_millis() as u64;

    let conversation_id = state
        .store
        .get_call(&call_sid)
        .await
        .ok()
        .flatten()
        .and_then(|c| c.conversation_id);

    info!("Ad-hoc call {} to {}", call_sid, request.to);
    Ok(ApiResponse::ok(serde_json::json!({
        "callSid": call_sid,
        "conversationId": conversation_id,
        "timing": {
            "total": total_started.elapsed().as_millis() as u64,
            // The signed session URL is fetched when the media stream
            // opens, so the dial dominates this endpoint's latency.
            "signedUrl": 0,
            "twilioCall": dial_ms,
        },
    })))
}
