//! Call event endpoints

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub async fn events_for_call(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let events = state.store.events_for_call(&call_sid).await?;
    Ok(ApiResponse::ok(events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEventRequest {
    pub call_sid: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn append_event(
    State(state): State<AppState>,
    Json(request): Json<AppendEventRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.call_sid.trim().is_empty() {
        return Err(ApiError::validation("callSid is required"));
    }
    if request.event_type.trim().is_empty() {
        return Err(ApiError::validation("eventType is required"));
    }

    let event = state
        .store
        .append_event(
            &request.call_sid,
            &request.event_type,
            request.payload,
            request.source.as_deref().unwrap_or("api"),
        )
        .await?;
    Ok(ApiResponse::ok(event))
}
