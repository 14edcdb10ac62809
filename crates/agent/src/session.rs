//! Agent session client
//!
//! Fetches the signed session URL, connects the WebSocket within the
//! session-open timeout, sends the conversation initiation payload, and pumps
//! frames between the socket and a pair of typed channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, ClientEvent};
use crate::AgentPort;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Parameters for one conversational session.
#[derive(Debug, Clone, Default)]
pub struct OpenSessionRequest {
    pub prompt: String,
    pub first_message: String,
    pub dynamic_variables: serde_json::Value,
}

/// A live session, exposed as typed channels.
///
/// Dropping either channel end tears the session down: the writer task exits
/// when `outbound` closes and the socket close surfaces as `inbound` ending.
pub struct AgentSession {
    /// Agent-assigned conversation id, when announced during the handshake.
    pub conversation_id: Option<String>,
    /// Events received from the agent.
    pub inbound: mpsc::Receiver<AgentEvent>,
    /// Events to send to the agent.
    pub outbound: mpsc::Sender<ClientEvent>,
}

/// HTTP + WebSocket implementation of [`AgentPort`].
#[derive(Clone)]
pub struct HttpAgentClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    agent_id: String,
    open_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

impl HttpAgentClient {
    pub fn new(api_key: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self::with_base_url(api_key, agent_id, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        agent_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            agent_id: agent_id.into(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Obtain the short-lived signed session URL. The caller must connect
    /// within seconds.
    pub async fn signed_url(&self) -> Result<SignedUrl> {
        let url = format!(
            "{}/v1/convai/conversation/get-signed-url?agent_id={}",
            self.base_url, self.agent_id
        );
        let response = self
            .http
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .timeout(self.open_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Protocol(format!("bad signed-url response: {e}")))?;
        Ok(SignedUrl {
            url: signed.signed_url,
            conversation_id: signed.conversation_id,
        })
    }
}

/// Signed session URL plus the conversation id when the provider assigns it
/// at issue time.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub conversation_id: Option<String>,
}

#[async_trait]
impl AgentPort for HttpAgentClient {
    async fn open_session(&self, request: OpenSessionRequest) -> Result<AgentSession> {
        let signed = self.signed_url().await?;

        let (ws, _response) =
            tokio::time::timeout(self.open_timeout, connect_async(signed.url.as_str()))
                .await
                .map_err(|_| AgentError::OpenTimeout(self.open_timeout))??;
        debug!("Agent session socket connected");

        let (mut ws_tx, mut ws_rx) = ws.split();

        // Conversation overrides go out first, before any audio.
        let initiation = ClientEvent::Initiation {
            prompt: request.prompt,
            first_message: request.first_message,
            dynamic_variables: request.dynamic_variables,
        };
        ws_tx.send(Message::text(initiation.to_message())).await?;

        let (inbound_tx, inbound_rx) = mpsc::channel::<AgentEvent>(SESSION_CHANNEL_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientEvent>(SESSION_CHANNEL_CAPACITY);

        // Capture the conversation id from the handshake metadata when the
        // signed URL did not already carry one.
        let mut conversation_id = signed.conversation_id;
        if conversation_id.is_none() {
            let deadline = tokio::time::timeout(self.open_timeout, ws_rx.next());
            match deadline.await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    if let Some(event) = AgentEvent::decode(&text) {
                        if let AgentEvent::Metadata { metadata_event } = &event {
                            conversation_id = Some(metadata_event.conversation_id.clone());
                        }
                        // Forward whatever arrived; the bridge sees the full stream.
                        let _ = inbound_tx.send(event).await;
                    }
                }
                Ok(Some(Ok(_))) | Ok(None) => {}
                Ok(Some(Err(e))) => return Err(AgentError::Socket(e)),
                Err(_) => {
                    warn!("No handshake metadata within {:?}", self.open_timeout);
                }
            }
        }

        // Writer: typed events -> socket.
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::text(event.to_message())).await {
                    debug!("Agent session writer closing: {}", e);
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: socket -> typed events. Unparseable frames are logged and
        // skipped.
        let reader_tx = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => match AgentEvent::decode(&text) {
                        Some(event) => {
                            if reader_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => warn!("Unparseable agent frame: {:.120}", text.as_str()),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Agent session reader closing: {}", e);
                        break;
                    }
                }
            }
        });

        info!(
            "Agent session open (conversation_id={})",
            conversation_id.as_deref().unwrap_or("pending")
        );
        Ok(AgentSession {
            conversation_id,
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}
