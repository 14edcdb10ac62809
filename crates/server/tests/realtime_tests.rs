//! End-to-end media and realtime socket tests
//!
//! Boots the full server on an ephemeral port, connects a fake carrier to
//! the media-stream socket and a dashboard client to `/rt`, and checks that
//! agent events flow through the bridge into typewriter-style transcript
//! updates and call status pushes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use dialflow_agent::events::{AgentResponseEvent, AudioEvent};
use dialflow_agent::{AgentEvent, MockAgent};
use dialflow_engine::EngineConfig;
use dialflow_server::{router, AppState, ServerConfig};
use dialflow_store::calls::NewCall;
use dialflow_telephony::MockTelephony;

struct LiveServer {
    addr: SocketAddr,
    state: AppState,
    agent: MockAgent,
}

async fn live_server() -> LiveServer {
    let agent = MockAgent::new();
    let mut engine_config = EngineConfig::for_tests();
    // Long enough that nothing times out while the test drives the sockets.
    engine_config.media_inactivity_timeout = Duration::from_secs(5);

    let state = AppState::assemble(
        ServerConfig::for_tests(),
        Arc::new(MockTelephony::new()),
        Arc::new(agent.clone()),
        engine_config,
    )
    .await
    .expect("state assembles");
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    LiveServer { addr, state, agent }
}

fn start_frame_json(call_sid: &str) -> String {
    serde_json::json!({
        "event": "start",
        "start": {
            "streamSid": "MZ-live",
            "callSid": call_sid,
            "customParameters": {
                "prompt": "be helpful",
                "firstMessage": "hello",
            },
        },
    })
    .to_string()
}

async fn next_json(
    socket: &mut (impl futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("socket frame before timeout")
            .expect("socket open")
            .expect("socket read");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

#[tokio::test]
async fn test_media_stream_feeds_typewriter_to_dashboard() {
    let server = live_server().await;
    server
        .state
        .store
        .upsert_call(&NewCall::outbound("CA-live", "+1555", "+1666"))
        .await
        .unwrap();

    // Dashboard client subscribes to the call's transcript feed
    let (mut dashboard, _) = connect_async(format!("ws://{}/rt", server.addr))
        .await
        .expect("rt connect");
    dashboard
        .send(Message::text(
            serde_json::json!({
                "type": "subscribe_to_call_transcript",
                "callSid": "CA-live",
            })
            .to_string(),
        ))
        .await
        .unwrap();

    // Carrier connects its media stream and announces the call
    let (mut carrier, _) = connect_async(format!("ws://{}/outbound-media-stream", server.addr))
        .await
        .expect("media connect");
    carrier
        .send(Message::text(start_frame_json("CA-live")))
        .await
        .unwrap();

    // Wait until the bridge has opened the agent session
    let connection = {
        let mut found = None;
        for _ in 0..100 {
            if let Some(connection) = server.agent.last_connection() {
                found = Some(connection);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        found.expect("agent session opened")
    };
    assert_eq!(connection.request.prompt, "be helpful");

    // Agent speaks: the line is persisted and typewritten to the dashboard
    connection
        .emit(AgentEvent::AgentResponse {
            agent_response_event: AgentResponseEvent {
                agent_response: "Hello from the assistant".to_string(),
                event_id: Some(1),
            },
        })
        .await;

    let mut saw_partial = false;
    loop {
        let event = next_json(&mut dashboard).await;
        assert_eq!(event["type"], "transcript_message");
        assert_eq!(event["data"]["callSid"], "CA-live");
        if event["data"]["final"].as_bool().unwrap() {
            assert_eq!(event["data"]["text"], "Hello from the assistant");
            break;
        }
        saw_partial = true;
    }
    assert!(saw_partial, "typewriter should emit partial chunks first");

    // The full line landed in the store exactly once
    let transcript = server
        .state
        .store
        .transcript_for_call("CA-live")
        .await
        .unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].text, "Hello from the assistant");

    // Agent audio is relayed back on the same stream sid
    connection
        .emit(AgentEvent::Audio {
            audio_event: AudioEvent {
                audio_base64: "QUdFTlQ=".to_string(),
                event_id: Some(2),
            },
        })
        .await;
    let media = next_json(&mut carrier).await;
    assert_eq!(media["event"], "media");
    assert_eq!(media["streamSid"], "MZ-live");
    assert_eq!(media["media"]["payload"], "QUdFTlQ=");

    let _ = carrier
        .send(Message::text(
            serde_json::json!({"event": "stop"}).to_string(),
        ))
        .await;
    let _ = carrier.close(None).await;
}

#[tokio::test]
async fn test_status_updates_reach_calls_topic() {
    let server = live_server().await;
    server
        .state
        .store
        .upsert_call(&NewCall::outbound("CA-status", "+1555", "+1666"))
        .await
        .unwrap();

    let (mut dashboard, _) = connect_async(format!("ws://{}/rt", server.addr))
        .await
        .expect("rt connect");
    dashboard
        .send(Message::text(
            serde_json::json!({"type": "subscribe_to_calls"}).to_string(),
        ))
        .await
        .unwrap();

    // The snapshot arrives first
    let snapshot = next_json(&mut dashboard).await;
    assert_eq!(snapshot["type"], "active_calls");

    // A carrier webhook drives a state change which is pushed live
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/webhooks/carrier", server.addr))
        .form(&[("CallSid", "CA-status"), ("CallStatus", "ringing")])
        .send()
        .await
        .expect("webhook post");
    assert!(response.status().is_success());

    let update = next_json(&mut dashboard).await;
    assert_eq!(update["type"], "status_update");
    assert_eq!(update["data"]["callSid"], "CA-status");
    assert_eq!(update["data"]["status"], "ringing");
}
