//! Agent transcript webhook
//!
//! Signed JSON posted by the conversational-AI provider after a conversation
//! ends. Carries the authoritative transcript plus optional analysis.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use dialflow_engine::{HubEvent, Topic};
use dialflow_store::transcripts::FinalizedLine;
use dialflow_store::{CallStatus, TranscriptRole};

use crate::webhooks::signature;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Deserialize)]
pub struct AgentWebhook {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub data: AgentWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct AgentWebhookData {
    pub conversation_id: String,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    #[serde(alias = "text")]
    pub message: Option<String>,
    #[serde(default)]
    pub time_in_call_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub transcript_summary: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub call_successful: Option<String>,
}

/// Handle one signed agent payload.
#[instrument(name = "agent_webhook", skip_all)]
pub async fn agent_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Signature gate first: nothing below runs on a bad request.
    let presented = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !signature::verify(&state.config.agent_webhook_secret, &body, presented) {
        warn!("Agent webhook rejected: bad signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload: AgentWebhook = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Agent webhook rejected: bad body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let conversation_id = payload.data.conversation_id.clone();
    let call = match state
        .store
        .get_call_by_conversation_id(&conversation_id)
        .await
    {
        Ok(Some(call)) => call,
        Ok(None) => {
            warn!("Agent webhook for unknown conversation {}", conversation_id);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            warn!("Agent webhook store lookup failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let call_sid = call.call_sid.clone();
    info!(
        "Finalized transcript for call {} ({} lines)",
        call_sid,
        payload.data.transcript.len()
    );

    let lines: Vec<FinalizedLine> = payload
        .data
        .transcript
        .iter()
        .filter_map(|entry| {
            let text = entry.message.clone()?;
            Some(FinalizedLine {
                role: parse_role(&entry.role),
                text,
                offset_secs: entry.time_in_call_secs,
            })
        })
        .collect();

    if let Err(e) = state
        .store
        .replace_finalized_transcript(&call_sid, &lines)
        .await
    {
        warn!("Failed to finalize transcript for {}: {}", call_sid, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Some(analysis) = &payload.data.analysis {
        let _ = state
            .store
            .append_event(
                &call_sid,
                "call_analysis",
                serde_json::json!({
                    "summary": analysis.transcript_summary,
                    "sentiment": analysis.sentiment,
                    "callSuccessful": analysis.call_successful,
                }),
                "agent",
            )
            .await;
    }

    let _ = state
        .store
        .append_event(
            &call_sid,
            "transcript_finalized",
            serde_json::json!({
                "conversationId": conversation_id,
                "lines": lines.len(),
            }),
            "agent",
        )
        .await;

    let event = HubEvent::new(
        "transcript_update",
        serde_json::json!({
            "callSid": call_sid,
            "conversationId": conversation_id,
            "source": "finalized",
            "lines": lines.len(),
        }),
    );
    state.hub.publish(&Topic::Transcripts, event.clone());
    state.hub.publish(&Topic::transcript(&call_sid), event);

    // The webhook records; it never drives termination. An in-progress call
    // keeps running until its own causes fire.
    if !call.status.is_terminal() && call.status != CallStatus::Terminating {
        info!(
            "Transcript finalized while call {} is {}; recording only",
            call_sid,
            call.status.as_str()
        );
    }

    (StatusCode::OK, "Webhook received").into_response()
}

fn parse_role(role: &str) -> TranscriptRole {
    match role {
        "agent" | "assistant" => TranscriptRole::Agent,
        "user" | "caller" => TranscriptRole::User,
        _ => TranscriptRole::System,
    }
}
