//! Scriptable in-memory agent for bridge and lifecycle tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::{AgentEvent, ClientEvent};
use crate::session::{AgentSession, OpenSessionRequest};
use crate::AgentPort;

/// Test double for [`AgentPort`].
///
/// Each `open_session` hands back a session wired to a
/// [`MockAgentConnection`] the test drives: push inbound events, observe
/// outbound ones.
#[derive(Clone, Default)]
pub struct MockAgent {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    counter: u64,
    connections: Vec<MockAgentConnection>,
}

/// Test-side handle to one mock session.
#[derive(Clone)]
pub struct MockAgentConnection {
    pub conversation_id: String,
    pub request: OpenSessionRequest,
    to_bridge: Arc<Mutex<Option<mpsc::Sender<AgentEvent>>>>,
    from_bridge: Arc<Mutex<Vec<ClientEvent>>>,
}

impl MockAgentConnection {
    /// Push an event toward the bridge, as if the agent had sent it.
    pub async fn emit(&self, event: AgentEvent) {
        let sender = self.to_bridge.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Close the agent side of the session; the bridge observes its inbound
    /// stream ending.
    pub fn close(&self) {
        self.to_bridge.lock().take();
    }

    /// Everything the bridge sent to the agent so far.
    pub fn sent(&self) -> Vec<ClientEvent> {
        self.from_bridge.lock().clone()
    }
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections opened so far, in order.
    pub fn connections(&self) -> Vec<MockAgentConnection> {
        self.inner.lock().connections.clone()
    }

    /// The most recent connection, if any session was opened.
    pub fn last_connection(&self) -> Option<MockAgentConnection> {
        self.inner.lock().connections.last().cloned()
    }
}

#[async_trait]
impl AgentPort for MockAgent {
    async fn open_session(&self, request: OpenSessionRequest) -> Result<AgentSession> {
        let (to_bridge_tx, to_bridge_rx) = mpsc::channel::<AgentEvent>(64);
        let (from_bridge_tx, mut from_bridge_rx) = mpsc::channel::<ClientEvent>(64);

        let captured: Arc<Mutex<Vec<ClientEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = captured.clone();
        tokio::spawn(async move {
            while let Some(event) = from_bridge_rx.recv().await {
                capture.lock().push(event);
            }
        });

        let mut state = self.inner.lock();
        state.counter += 1;
        let conversation_id = format!("conv-mock-{:04}", state.counter);
        let connection = MockAgentConnection {
            conversation_id: conversation_id.clone(),
            request,
            to_bridge: Arc::new(Mutex::new(Some(to_bridge_tx))),
            from_bridge: captured,
        };
        state.connections.push(connection);

        Ok(AgentSession {
            conversation_id: Some(conversation_id),
            inbound: to_bridge_rx,
            outbound: from_bridge_tx,
        })
    }
}
