//! Media bridge
//!
//! One bridge instance per live call, created when the carrier's media
//! stream opens. The bridge proxies audio both ways, interprets agent
//! control events, persists realtime transcript lines, and reports
//! termination causes to the lifecycle manager. It never hangs up a call
//! itself.
//!
//! The control flow is a single task consuming a merged inbound stream
//! (carrier frames, agent events, inactivity timer) and emitting to typed
//! outbound channels: [`CarrierMessage`] back to the media socket and
//! [`BridgeSignal`] to the lifecycle manager.

pub mod frames;

pub use frames::{CarrierFrame, CarrierMessage, MediaFrame, StartFrame};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dialflow_agent::{AgentEvent, AgentPort, ClientEvent, OpenSessionRequest};
use dialflow_store::transcripts::NewTranscriptMessage;
use dialflow_store::{Store, TranscriptRole, TranscriptSource};

use crate::config::EngineConfig;
use crate::hub::RealtimeHub;
use crate::typewriter;

/// Which side of the bridge a socket event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSide {
    Carrier,
    Agent,
}

/// Typed signals the bridge emits to the lifecycle manager.
///
/// The bridge only reports; the lifecycle manager owns the telephony action.
#[derive(Debug, Clone)]
pub enum BridgeSignal {
    /// Agent session established; carries the conversation id when known.
    SessionOpened {
        call_sid: String,
        conversation_id: Option<String>,
    },
    /// The agent finished the conversation.
    ConversationComplete { call_sid: String },
    /// No frames from either side within the inactivity window.
    Inactivity { call_sid: String },
    /// Agent-side protocol error.
    AgentError { call_sid: String, message: String },
    /// One of the sockets closed; the bridge is draining and exiting.
    Closed { call_sid: String, side: SocketSide },
}

impl BridgeSignal {
    pub fn call_sid(&self) -> &str {
        match self {
            BridgeSignal::SessionOpened { call_sid, .. }
            | BridgeSignal::ConversationComplete { call_sid }
            | BridgeSignal::Inactivity { call_sid }
            | BridgeSignal::AgentError { call_sid, .. }
            | BridgeSignal::Closed { call_sid, .. } => call_sid,
        }
    }
}

/// Counters and latency telemetry for one bridge's lifetime.
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    pub call_sid: String,
    pub frames_to_agent: u64,
    pub frames_to_carrier: u64,
    pub transcript_messages: u64,
    pub latency_samples: u64,
    pub latency_total: Duration,
    pub latency_max: Duration,
}

impl BridgeStats {
    /// Mean audio round-trip latency over the bridge's lifetime.
    pub fn latency_avg(&self) -> Duration {
        if self.latency_samples == 0 {
            Duration::ZERO
        } else {
            self.latency_total / self.latency_samples as u32
        }
    }
}

/// Spawns one [`MediaBridge`] per media stream connection.
#[derive(Clone)]
pub struct BridgeManager {
    store: Store,
    hub: RealtimeHub,
    agent: Arc<dyn AgentPort>,
    config: EngineConfig,
    signals: mpsc::Sender<BridgeSignal>,
}

impl BridgeManager {
    pub fn new(
        store: Store,
        hub: RealtimeHub,
        agent: Arc<dyn AgentPort>,
        config: EngineConfig,
        signals: mpsc::Sender<BridgeSignal>,
    ) -> Self {
        Self {
            store,
            hub,
            agent,
            config,
            signals,
        }
    }

    /// Run a bridge over an already-accepted media socket, expressed as a
    /// pair of frame channels. Returns the bridge task handle.
    pub fn spawn(
        &self,
        carrier_rx: mpsc::Receiver<CarrierFrame>,
        to_carrier: mpsc::Sender<CarrierMessage>,
    ) -> JoinHandle<BridgeStats> {
        let bridge = MediaBridge {
            store: self.store.clone(),
            hub: self.hub.clone(),
            agent: self.agent.clone(),
            config: self.config.clone(),
            signals: self.signals.clone(),
        };
        tokio::spawn(bridge.run(carrier_rx, to_carrier))
    }
}

struct MediaBridge {
    store: Store,
    hub: RealtimeHub,
    agent: Arc<dyn AgentPort>,
    config: EngineConfig,
    signals: mpsc::Sender<BridgeSignal>,
}

impl MediaBridge {
    async fn run(
        self,
        mut carrier_rx: mpsc::Receiver<CarrierFrame>,
        to_carrier: mpsc::Sender<CarrierMessage>,
    ) -> BridgeStats {
        let mut stats = BridgeStats::default();

        // The carrier announces which call this socket carries on `start`.
        let start = match self.wait_for_start(&mut carrier_rx).await {
            Some(start) => start,
            None => {
                warn!("Media socket closed before start frame");
                return stats;
            }
        };
        let call_sid = start.call_sid.clone();
        let stream_sid = start.stream_sid.clone();
        stats.call_sid = call_sid.clone();
        info!("Bridge up for call {} (stream {})", call_sid, stream_sid);

        // Custom parameters carry the conversation configuration the dialer
        // attached to this call.
        let request = open_request_from_parameters(&start);
        let mut session = match tokio::time::timeout(
            self.config.session_open_timeout,
            self.agent.open_session(request),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!("Agent session open failed for {}: {}", call_sid, e);
                self.signal(BridgeSignal::AgentError {
                    call_sid: call_sid.clone(),
                    message: e.to_string(),
                })
                .await;
                self.drain(&mut carrier_rx).await;
                return stats;
            }
            Err(_) => {
                warn!("Agent session open timed out for {}", call_sid);
                self.signal(BridgeSignal::AgentError {
                    call_sid: call_sid.clone(),
                    message: "session open timeout".to_string(),
                })
                .await;
                self.drain(&mut carrier_rx).await;
                return stats;
            }
        };

        let mut conversation_id = session.conversation_id.clone();
        if let Some(conv_id) = &conversation_id {
            if let Err(e) = self.store.set_conversation_id(&call_sid, conv_id).await {
                warn!("Failed to persist conversation id for {}: {}", call_sid, e);
            }
        }
        self.signal(BridgeSignal::SessionOpened {
            call_sid: call_sid.clone(),
            conversation_id: conversation_id.clone(),
        })
        .await;

        // Inactivity timer covers both directions; any carrier media or
        // agent event resets it.
        let inactivity = tokio::time::sleep(self.config.media_inactivity_timeout);
        tokio::pin!(inactivity);
        let mut inactivity_reported = false;

        let mut last_media_at: Option<Instant> = None;
        let closed_side;

        loop {
            tokio::select! {
                frame = carrier_rx.recv() => {
                    match frame {
                        Some(CarrierFrame::Media { media }) => {
                            last_media_at = Some(Instant::now());
                            inactivity.as_mut().reset(
                                tokio::time::Instant::now() + self.config.media_inactivity_timeout,
                            );
                            stats.frames_to_agent += 1;
                            if session
                                .outbound
                                .send(ClientEvent::AudioChunk { audio_base64: media.payload })
                                .await
                                .is_err()
                            {
                                closed_side = SocketSide::Agent;
                                break;
                            }
                        }
                        Some(CarrierFrame::Stop) | None => {
                            closed_side = SocketSide::Carrier;
                            break;
                        }
                        Some(CarrierFrame::Start { .. }) | Some(CarrierFrame::Connected) => {}
                        Some(CarrierFrame::Unknown) => {
                            debug!("Ignoring unknown carrier frame on {}", call_sid);
                        }
                    }
                }
                event = session.inbound.recv() => {
                    match event {
                        Some(event) => {
                            inactivity.as_mut().reset(
                                tokio::time::Instant::now() + self.config.media_inactivity_timeout,
                            );
                            if let Some(side) = self
                                .handle_agent_event(
                                    event,
                                    &call_sid,
                                    &stream_sid,
                                    &mut conversation_id,
                                    &to_carrier,
                                    &session.outbound,
                                    last_media_at,
                                    &mut stats,
                                )
                                .await
                            {
                                closed_side = side;
                                break;
                            }
                        }
                        None => {
                            closed_side = SocketSide::Agent;
                            break;
                        }
                    }
                }
                () = &mut inactivity, if !inactivity_reported => {
                    info!("Inactivity timeout on call {}", call_sid);
                    inactivity_reported = true;
                    self.signal(BridgeSignal::Inactivity { call_sid: call_sid.clone() }).await;
                    // The lifecycle manager owns the hangup; keep relaying
                    // until a socket actually closes.
                }
            }
        }

        self.signal(BridgeSignal::Closed {
            call_sid: call_sid.clone(),
            side: closed_side,
        })
        .await;

        self.drain(&mut carrier_rx).await;
        info!(
            "Bridge down for call {}: {} frames up, {} down, {} transcript lines, avg latency {:?}",
            call_sid,
            stats.frames_to_agent,
            stats.frames_to_carrier,
            stats.transcript_messages,
            stats.latency_avg(),
        );
        stats
    }

    /// Dispatch one agent event. Returns `Some(side)` when the loop should
    /// exit because a socket is effectively gone.
    #[allow(clippy::too_many_arguments)]
    async fn handle_agent_event(
        &self,
        event: AgentEvent,
        call_sid: &str,
        stream_sid: &str,
        conversation_id: &mut Option<String>,
        to_carrier: &mpsc::Sender<CarrierMessage>,
        to_agent: &mpsc::Sender<ClientEvent>,
        last_media_at: Option<Instant>,
        stats: &mut BridgeStats,
    ) -> Option<SocketSide> {
        match event {
            AgentEvent::Audio { audio_event } => {
                if let Some(at) = last_media_at {
                    let sample = at.elapsed();
                    stats.latency_samples += 1;
                    stats.latency_total += sample;
                    stats.latency_max = stats.latency_max.max(sample);
                }
                stats.frames_to_carrier += 1;
                let message = CarrierMessage::Media {
                    stream_sid: stream_sid.to_string(),
                    payload: audio_event.audio_base64,
                };
                if to_carrier.send(message).await.is_err() {
                    return Some(SocketSide::Carrier);
                }
            }
            AgentEvent::Interruption { .. } => {
                debug!("Interruption on {}: clearing carrier buffer", call_sid);
                let message = CarrierMessage::Clear {
                    stream_sid: stream_sid.to_string(),
                };
                if to_carrier.send(message).await.is_err() {
                    return Some(SocketSide::Carrier);
                }
            }
            AgentEvent::Ping { ping_event } => {
                let pong = ClientEvent::Pong {
                    event_id: ping_event.event_id,
                };
                if to_agent.send(pong).await.is_err() {
                    return Some(SocketSide::Agent);
                }
            }
            AgentEvent::UserTranscript {
                user_transcription_event,
            } => {
                self.persist_and_stream(
                    call_sid,
                    TranscriptRole::User,
                    user_transcription_event.user_transcript,
                    conversation_id.as_deref(),
                    user_transcription_event.event_id,
                    stats,
                )
                .await;
            }
            AgentEvent::AgentResponse {
                agent_response_event,
            } => {
                self.persist_and_stream(
                    call_sid,
                    TranscriptRole::Agent,
                    agent_response_event.agent_response,
                    conversation_id.as_deref(),
                    agent_response_event.event_id,
                    stats,
                )
                .await;
            }
            AgentEvent::ConversationComplete { .. } => {
                info!("Agent reported conversation complete on {}", call_sid);
                self.signal(BridgeSignal::ConversationComplete {
                    call_sid: call_sid.to_string(),
                })
                .await;
            }
            AgentEvent::Metadata { metadata_event } => {
                if conversation_id.is_none() {
                    *conversation_id = Some(metadata_event.conversation_id.clone());
                    if let Err(e) = self
                        .store
                        .set_conversation_id(call_sid, &metadata_event.conversation_id)
                        .await
                    {
                        warn!("Failed to persist conversation id for {}: {}", call_sid, e);
                    }
                }
            }
            AgentEvent::Error { error_event } => {
                let message = error_event
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "unspecified agent error".to_string());
                warn!("Agent error on {}: {}", call_sid, message);
                self.signal(BridgeSignal::AgentError {
                    call_sid: call_sid.to_string(),
                    message,
                })
                .await;
            }
            AgentEvent::Unknown => {
                debug!("Ignoring unknown agent event on {}", call_sid);
            }
        }
        None
    }

    /// Persist a transcript line and fan it out with typewriter cadence.
    ///
    /// The store gets the complete message in one append; only the hub
    /// fan-out is chunked.
    async fn persist_and_stream(
        &self,
        call_sid: &str,
        role: TranscriptRole,
        text: String,
        conversation_id: Option<&str>,
        event_id: Option<u64>,
        stats: &mut BridgeStats,
    ) {
        let external_id = match (conversation_id, event_id) {
            (Some(conv), Some(id)) => Some(format!("{conv}:{role:?}:{id}").to_lowercase()),
            _ => None,
        };

        let sequence = match self
            .store
            .append_transcript_message(&NewTranscriptMessage {
                call_sid: call_sid.to_string(),
                role,
                text: text.clone(),
                offset_secs: None,
                source: TranscriptSource::Realtime,
                external_id,
            })
            .await
        {
            Ok(sequence) => sequence,
            Err(e) => {
                // Store failures never kill the bridge; the finalized
                // transcript webhook will still deliver this line.
                warn!("Failed to persist transcript line for {}: {}", call_sid, e);
                0
            }
        };
        stats.transcript_messages += 1;

        let hub = self.hub.clone();
        let config = self.config.typewriter.clone();
        let call_sid = call_sid.to_string();
        tokio::spawn(async move {
            typewriter::stream_message(&hub, &config, &call_sid, role, sequence, &text).await;
        });
    }

    async fn wait_for_start(
        &self,
        carrier_rx: &mut mpsc::Receiver<CarrierFrame>,
    ) -> Option<StartFrame> {
        let deadline = tokio::time::Instant::now() + self.config.media_inactivity_timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, carrier_rx.recv())
                .await
                .ok()??;
            match frame {
                CarrierFrame::Start { start } => return Some(start),
                CarrierFrame::Connected | CarrierFrame::Unknown => continue,
                CarrierFrame::Media { .. } => continue,
                CarrierFrame::Stop => return None,
            }
        }
    }

    /// Consume whatever is left on the carrier socket within the grace
    /// window so the peer sees a clean close.
    async fn drain(&self, carrier_rx: &mut mpsc::Receiver<CarrierFrame>) {
        let deadline = tokio::time::Instant::now() + self.config.bridge_drain_grace;
        loop {
            match tokio::time::timeout_at(deadline, carrier_rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn signal(&self, signal: BridgeSignal) {
        if self.signals.send(signal).await.is_err() {
            debug!("Lifecycle signal channel closed");
        }
    }
}

/// Build the agent session request from the `start` frame's custom
/// parameters. Everything that is not a reserved key becomes a dynamic
/// variable.
fn open_request_from_parameters(start: &StartFrame) -> OpenSessionRequest {
    let params = &start.custom_parameters;
    let prompt = params.get("prompt").cloned().unwrap_or_default();
    let first_message = params.get("firstMessage").cloned().unwrap_or_default();

    let mut dynamic = serde_json::Map::new();
    for (key, value) in params {
        if key != "prompt" && key != "firstMessage" {
            dynamic.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
    }

    OpenSessionRequest {
        prompt,
        first_message,
        dynamic_variables: serde_json::Value::Object(dynamic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialflow_agent::events::{
        AgentResponseEvent, AudioEvent, PingEvent, UserTranscriptionEvent,
    };
    use dialflow_agent::MockAgent;
    use dialflow_store::CallStatus;
    use std::collections::HashMap;

    struct Harness {
        manager: BridgeManager,
        store: Store,
        hub: RealtimeHub,
        agent: MockAgent,
        signals_rx: mpsc::Receiver<BridgeSignal>,
    }

    async fn harness() -> Harness {
        let store = Store::new_in_memory().await.unwrap();
        let hub = RealtimeHub::new(50);
        let agent = MockAgent::new();
        let (signals_tx, signals_rx) = mpsc::channel(64);
        let manager = BridgeManager::new(
            store.clone(),
            hub.clone(),
            Arc::new(agent.clone()),
            EngineConfig::for_tests(),
            signals_tx,
        );
        Harness {
            manager,
            store,
            hub,
            agent,
            signals_rx,
        }
    }

    fn start_frame(call_sid: &str) -> CarrierFrame {
        let mut params = HashMap::new();
        params.insert("prompt".to_string(), "be kind".to_string());
        params.insert("firstMessage".to_string(), "hello".to_string());
        params.insert("contactName".to_string(), "Ada".to_string());
        CarrierFrame::Start {
            start: StartFrame {
                stream_sid: "MZ1".to_string(),
                call_sid: call_sid.to_string(),
                custom_parameters: params,
            },
        }
    }

    #[tokio::test]
    async fn test_session_open_records_conversation_id() {
        let mut h = harness().await;
        h.store
            .upsert_call(&dialflow_store::calls::NewCall::outbound(
                "CA1", "+1555", "+1666",
            ))
            .await
            .unwrap();

        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, _to_carrier_rx) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(CarrierFrame::Connected).await.unwrap();
        carrier_tx.send(start_frame("CA1")).await.unwrap();

        match h.signals_rx.recv().await.unwrap() {
            BridgeSignal::SessionOpened {
                call_sid,
                conversation_id,
            } => {
                assert_eq!(call_sid, "CA1");
                assert_eq!(conversation_id.as_deref(), Some("conv-mock-0001"));
            }
            other => panic!("wrong signal: {other:?}"),
        }

        // Conversation id persisted against the call
        let call = h.store.get_call("CA1").await.unwrap().unwrap();
        assert_eq!(call.conversation_id.as_deref(), Some("conv-mock-0001"));
        assert_eq!(call.status, CallStatus::Queued);

        // Prompt and variables flowed into the session request
        let connection = h.agent.last_connection().unwrap();
        assert_eq!(connection.request.prompt, "be kind");
        assert_eq!(connection.request.dynamic_variables["contactName"], "Ada");

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_audio_flows_both_ways() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, mut to_carrier_rx) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA2")).await.unwrap();
        let _ = h.signals_rx.recv().await; // SessionOpened

        // Carrier -> agent
        carrier_tx
            .send(CarrierFrame::Media {
                media: MediaFrame {
                    payload: "Q0FMTA==".to_string(),
                },
            })
            .await
            .unwrap();

        let connection = h.agent.last_connection().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let sent = connection.sent();
        assert!(sent
            .iter()
            .any(|e| matches!(e, ClientEvent::AudioChunk { audio_base64 } if audio_base64 == "Q0FMTA==")));

        // Agent -> carrier, stream sid preserved
        connection
            .emit(AgentEvent::Audio {
                audio_event: AudioEvent {
                    audio_base64: "QUdFTlQ=".to_string(),
                    event_id: Some(1),
                },
            })
            .await;
        match to_carrier_rx.recv().await.unwrap() {
            CarrierMessage::Media { stream_sid, payload } => {
                assert_eq!(stream_sid, "MZ1");
                assert_eq!(payload, "QUdFTlQ=");
            }
            other => panic!("wrong message: {other:?}"),
        }

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.frames_to_agent, 1);
        assert_eq!(stats.frames_to_carrier, 1);
        assert_eq!(stats.latency_samples, 1);
    }

    #[tokio::test]
    async fn test_interruption_clears_and_ping_pongs() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, mut to_carrier_rx) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA3")).await.unwrap();
        let _ = h.signals_rx.recv().await;
        let connection = h.agent.last_connection().unwrap();

        connection
            .emit(AgentEvent::Interruption {
                interruption_event: None,
            })
            .await;
        assert!(matches!(
            to_carrier_rx.recv().await.unwrap(),
            CarrierMessage::Clear { .. }
        ));

        connection
            .emit(AgentEvent::Ping {
                ping_event: PingEvent {
                    event_id: 11,
                    ping_ms: None,
                },
            })
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(connection
            .sent()
            .iter()
            .any(|e| matches!(e, ClientEvent::Pong { event_id: 11 })));

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_transcripts_persist_and_stream() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, _keep) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA4")).await.unwrap();
        let _ = h.signals_rx.recv().await;

        let (_, mut transcript_rx) = h.hub.subscribe(&crate::hub::Topic::transcript("CA4"));
        let connection = h.agent.last_connection().unwrap();

        connection
            .emit(AgentEvent::AgentResponse {
                agent_response_event: AgentResponseEvent {
                    agent_response: "Hello Ada".to_string(),
                    event_id: Some(1),
                },
            })
            .await;
        connection
            .emit(AgentEvent::UserTranscript {
                user_transcription_event: UserTranscriptionEvent {
                    user_transcript: "Hi".to_string(),
                    event_id: Some(2),
                },
            })
            .await;

        // Wait for the final typewriter markers of both messages
        let mut finals = 0;
        while finals < 2 {
            let event = tokio::time::timeout(Duration::from_secs(1), transcript_rx.recv())
                .await
                .expect("typewriter events")
                .unwrap();
            if event.data["final"].as_bool().unwrap() {
                finals += 1;
            }
        }

        let transcript = h.store.transcript_for_call("CA4").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sequence, 1);
        assert_eq!(transcript[0].role, TranscriptRole::Agent);
        assert_eq!(transcript[0].text, "Hello Ada");
        assert_eq!(transcript[1].sequence, 2);
        assert_eq!(transcript[1].role, TranscriptRole::User);

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_conversation_complete_signal() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, _keep) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA5")).await.unwrap();
        let _ = h.signals_rx.recv().await;

        let connection = h.agent.last_connection().unwrap();
        connection
            .emit(AgentEvent::ConversationComplete {
                completion_event: None,
            })
            .await;

        match h.signals_rx.recv().await.unwrap() {
            BridgeSignal::ConversationComplete { call_sid } => assert_eq!(call_sid, "CA5"),
            other => panic!("wrong signal: {other:?}"),
        }

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        match h.signals_rx.recv().await.unwrap() {
            BridgeSignal::Closed { side, .. } => assert_eq!(side, SocketSide::Carrier),
            other => panic!("wrong signal: {other:?}"),
        }
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inactivity_fires_once() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, _keep) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA6")).await.unwrap();
        let _ = h.signals_rx.recv().await;

        // Silence on both sides: the test config times out after 200ms
        match tokio::time::timeout(Duration::from_secs(1), h.signals_rx.recv())
            .await
            .expect("inactivity signal")
            .unwrap()
        {
            BridgeSignal::Inactivity { call_sid } => assert_eq!(call_sid, "CA6"),
            other => panic!("wrong signal: {other:?}"),
        }

        carrier_tx.send(CarrierFrame::Stop).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_agent_socket_close_reported() {
        let mut h = harness().await;
        let (carrier_tx, carrier_rx) = mpsc::channel(16);
        let (to_carrier_tx, _keep) = mpsc::channel(16);
        let task = h.manager.spawn(carrier_rx, to_carrier_tx);

        carrier_tx.send(start_frame("CA7")).await.unwrap();
        let _ = h.signals_rx.recv().await;

        h.agent.last_connection().unwrap().close();

        match h.signals_rx.recv().await.unwrap() {
            BridgeSignal::Closed { side, .. } => assert_eq!(side, SocketSide::Agent),
            other => panic!("wrong signal: {other:?}"),
        }
        drop(carrier_tx);
        task.await.unwrap();
    }
}
