//! # Dialflow Agent Adapter
//!
//! Connects a live call to the conversational-AI provider: fetches a
//! short-lived signed session URL over HTTPS, opens the bidirectional
//! audio+event WebSocket, and exposes the session as a pair of typed
//! channels. The engine talks to the provider through the [`AgentPort`]
//! trait so bridge tests can swap in [`MockAgent`].

pub mod error;
pub mod events;
pub mod mock;
pub mod session;

pub use error::{AgentError, Result};
pub use events::{AgentEvent, ClientEvent};
pub use mock::{MockAgent, MockAgentConnection};
pub use session::{AgentSession, HttpAgentClient, OpenSessionRequest};

use async_trait::async_trait;

/// Provider operations the engine depends on.
#[async_trait]
pub trait AgentPort: Send + Sync {
    /// Open one conversational session for a call.
    ///
    /// The returned session carries the agent-assigned conversation id when
    /// the provider announced one during the handshake; callers record it
    /// against the call immediately so later webhooks can be correlated even
    /// if the session dies mid-call.
    async fn open_session(&self, request: OpenSessionRequest) -> Result<AgentSession>;
}
