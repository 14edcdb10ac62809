//! Session event grammar
//!
//! Inbound events are JSON objects tagged by `type`; each carries a nested
//! `*_event` payload object. Unknown types decode to [`AgentEvent::Unknown`]
//! and are treated as soft errors by the bridge.

use serde::{Deserialize, Serialize};

/// Events received from the agent over the session socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A chunk of agent speech to forward to the carrier.
    Audio { audio_event: AudioEvent },

    /// The caller started talking over the agent; flush buffered playback.
    Interruption {
        #[serde(default)]
        interruption_event: Option<InterruptionEvent>,
    },

    /// Realtime speech-to-text of the caller.
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },

    /// Realtime text of what the agent said.
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },

    /// Keep-alive; must be answered with a pong echoing the event id.
    Ping { ping_event: PingEvent },

    /// The agent considers the conversation finished.
    ConversationComplete {
        #[serde(default)]
        completion_event: Option<CompletionEvent>,
    },

    /// Session handshake metadata, including the conversation id.
    #[serde(rename = "metadata", alias = "conversation_initiation_metadata")]
    Metadata {
        #[serde(alias = "conversation_initiation_metadata_event")]
        metadata_event: MetadataEvent,
    },

    /// Agent-side protocol error; the call transitions to terminating.
    Error {
        #[serde(default)]
        error_event: Option<ErrorEvent>,
    },

    /// Any event type this build does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioEvent {
    /// Base64 PCM/μ-law chunk.
    #[serde(rename = "audio_base_64")]
    pub audio_base64: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionEvent {
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub event_id: u64,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEvent {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

impl AgentEvent {
    /// Decode one text frame; `None` means the frame was unparseable and the
    /// caller should log and continue.
    pub fn decode(text: &str) -> Option<AgentEvent> {
        serde_json::from_str(text).ok()
    }
}

/// Events sent to the agent over the session socket.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A chunk of caller audio.
    AudioChunk { audio_base64: String },

    /// Reply to a ping, echoing its event id.
    Pong { event_id: u64 },

    /// First message of the session: conversation overrides and variables.
    Initiation {
        prompt: String,
        first_message: String,
        dynamic_variables: serde_json::Value,
    },
}

impl ClientEvent {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ClientEvent::AudioChunk { audio_base64 } => serde_json::json!({
                "user_audio_chunk": audio_base64,
            }),
            ClientEvent::Pong { event_id } => serde_json::json!({
                "type": "pong",
                "event_id": event_id,
            }),
            ClientEvent::Initiation {
                prompt,
                first_message,
                dynamic_variables,
            } => serde_json::json!({
                "type": "conversation_initiation_client_data",
                "conversation_config_override": {
                    "agent": {
                        "prompt": { "prompt": prompt },
                        "first_message": first_message,
                    },
                },
                "dynamic_variables": dynamic_variables,
            }),
        }
    }

    pub fn to_message(&self) -> String {
        self.to_json().to_string()
    }
}
