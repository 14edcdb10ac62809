//! HTTP surface integration tests
//!
//! Exercise the router end-to-end against the mock carrier and agent:
//! envelope shapes, webhook signature gating, cascade deletes, and CSV
//! import idempotence.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use dialflow_agent::MockAgent;
use dialflow_engine::{EngineConfig, Topic};
use dialflow_server::{router, AppState, ServerConfig};
use dialflow_store::calls::NewCall;
use dialflow_store::recordings::NewRecording;
use dialflow_store::transcripts::NewTranscriptMessage;
use dialflow_store::{TranscriptRole, TranscriptSource};
use dialflow_telephony::MockTelephony;

async fn test_state() -> (AppState, Router) {
    let state = AppState::assemble(
        ServerConfig::for_tests(),
        Arc::new(MockTelephony::new()),
        Arc::new(MockAgent::new()),
        EngineConfig::for_tests(),
    )
    .await
    .expect("state assembles");
    let app = router(state.clone());
    (state, app)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_outbound_call_envelope() {
    let (_state, app) = test_state().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/outbound-call",
            serde_json::json!({
                "to": "+15551110001",
                "prompt": "be friendly",
                "first_message": "hello",
                "name": "Ada",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["callSid"], MockTelephony::sid_for(1));
    assert!(json["data"]["timing"]["total"].is_number());
    assert!(json["data"]["timing"]["twilioCall"].is_number());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_outbound_call_requires_to() {
    let (_state, app) = test_state().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/outbound-call",
            serde_json::json!({ "to": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_agent_webhook_bad_signature_has_no_side_effects() {
    let (state, app) = test_state().await;

    // Seed a call the webhook would target if it were accepted
    state
        .store
        .upsert_call(&NewCall::outbound("CA-sig", "+1555", "+1666"))
        .await
        .unwrap();
    state
        .store
        .set_conversation_id("CA-sig", "conv-sig")
        .await
        .unwrap();

    let (_, mut transcript_rx) = state.hub.subscribe(&Topic::Transcripts);

    let body = serde_json::json!({
        "type": "post_call_transcription",
        "data": {
            "conversation_id": "conv-sig",
            "transcript": [{"role": "agent", "message": "hi", "time_in_call_secs": 0.5}],
        },
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/agent")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Signature", "deadbeef")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // No rows written, no realtime event published
    assert!(state
        .store
        .transcript_for_call("CA-sig")
        .await
        .unwrap()
        .is_empty());
    assert!(state.store.events_for_call("CA-sig").await.unwrap().is_empty());
    assert!(transcript_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_agent_webhook_valid_signature_finalizes_transcript() {
    let (state, app) = test_state().await;

    state
        .store
        .upsert_call(&NewCall::outbound("CA-ok", "+1555", "+1666"))
        .await
        .unwrap();
    state
        .store
        .set_conversation_id("CA-ok", "conv-ok")
        .await
        .unwrap();
    // A realtime line already captured by the bridge
    state
        .store
        .append_transcript_message(&NewTranscriptMessage {
            call_sid: "CA-ok".to_string(),
            role: TranscriptRole::Agent,
            text: "live".to_string(),
            offset_secs: None,
            source: TranscriptSource::Realtime,
            external_id: None,
        })
        .await
        .unwrap();

    let body = serde_json::json!({
        "type": "post_call_transcription",
        "data": {
            "conversation_id": "conv-ok",
            "transcript": [
                {"role": "agent", "message": "Hello there", "time_in_call_secs": 0.5},
                {"role": "user", "message": "Hi", "time_in_call_secs": 2.0},
            ],
            "analysis": {"transcript_summary": "Friendly greeting", "sentiment": "positive"},
        },
    });
    let raw = body.to_string();
    let signature = {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(b"secret-test").unwrap();
        mac.update(raw.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    };

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/agent")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Signature", signature)
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let transcript = state.store.transcript_for_call("CA-ok").await.unwrap();
    let realtime = transcript
        .iter()
        .filter(|m| m.source == TranscriptSource::Realtime)
        .count();
    let finalized = transcript
        .iter()
        .filter(|m| m.source == TranscriptSource::Finalized)
        .count();
    assert_eq!(realtime, 1, "realtime lines are retained for audit");
    assert_eq!(finalized, 2);

    let events = state.store.events_for_call("CA-ok").await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"transcript_finalized"));
    assert!(types.contains(&"call_analysis"));
}

#[tokio::test]
async fn test_carrier_webhook_drives_lifecycle() {
    let (state, app) = test_state().await;

    state
        .store
        .upsert_call(&NewCall::outbound("CA-cb", "+1555", "+1666"))
        .await
        .unwrap();

    let form = "CallSid=CA-cb&CallStatus=in-progress&AnsweredBy=human";
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/carrier")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let call = state.store.get_call("CA-cb").await.unwrap().unwrap();
    assert_eq!(call.status, dialflow_store::CallStatus::InProgress);
    assert_eq!(call.answered_by, Some(dialflow_store::AnsweredBy::Human));
}

#[tokio::test]
async fn test_delete_call_cascades() {
    let (state, app) = test_state().await;

    state
        .store
        .upsert_call(&NewCall::outbound("CA-del", "+1555", "+1666"))
        .await
        .unwrap();
    state
        .store
        .upsert_recording(&NewRecording {
            recording_sid: "RE-del".to_string(),
            call_sid: "CA-del".to_string(),
            status: "completed".to_string(),
            url: None,
            duration_secs: Some(10),
            channels: 1,
        })
        .await
        .unwrap();
    for i in 0..5 {
        state
            .store
            .append_transcript_message(&NewTranscriptMessage {
                call_sid: "CA-del".to_string(),
                role: TranscriptRole::User,
                text: format!("line {i}"),
                offset_secs: None,
                source: TranscriptSource::Realtime,
                external_id: None,
            })
            .await
            .unwrap();
    }
    for i in 0..10 {
        state
            .store
            .append_event("CA-del", "status_update", serde_json::json!({ "i": i }), "test")
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/db/calls/CA-del")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);

    // Subsequent reads 404 / come back empty
    let get_call = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/db/calls/CA-del")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_call.status(), StatusCode::NOT_FOUND);

    let get_recording = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/recordings/RE-del/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_recording.status(), StatusCode::NOT_FOUND);

    let events = app
        .oneshot(
            Request::builder()
                .uri("/api/db/events/CA-del")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(events).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_contact_import_is_idempotent_over_http() {
    let (_state, app) = test_state().await;

    let body = serde_json::json!({
        "contacts": [
            {"phone": "+15551110001", "name": "Ada"},
            {"phone": "+15551110002"},
            {"phone": "+15551110001"},
        ],
    });

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/db/contacts/import",
                body.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let list = app
        .oneshot(
            Request::builder()
                .uri("/api/db/contacts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(list).await;
    assert_eq!(json["data"]["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_campaign_crud_and_validation() {
    let (_state, app) = test_state().await;

    // Missing name rejected at the edge
    let bad = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/db/campaigns",
            serde_json::json!({ "name": "  " }),
        ))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/db/campaigns",
            serde_json::json!({
                "name": "Launch blast",
                "prompt": "be nice",
                "firstMessage": "hi",
                "contacts": [{"phone": "+15551110001", "name": "Ada"}],
                "settings": {
                    "maxConcurrentCalls": 2,
                    "callDelayMillis": 1000,
                    "retryCount": 1,
                    "retryDelayMillis": 5000,
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let json = body_json(created).await;
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["status"], "draft");
    assert_eq!(json["data"]["contactIds"].as_array().unwrap().len(), 1);

    let fetched = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/db/campaigns/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);

    let missing = app
        .oneshot(
            Request::builder()
                .uri("/api/db/campaigns/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_calls_export_is_csv() {
    let (state, app) = test_state().await;
    state
        .store
        .upsert_call(&NewCall::outbound("CA-csv", "+1555", "+1666"))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/db/calls/actions/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("callSid,"));
    assert!(text.contains("CA-csv"));
}
