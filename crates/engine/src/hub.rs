//! Realtime hub
//!
//! Topic-based publish/subscribe pushing state changes to dashboard clients.
//! Delivery is at-most-once, best-effort, in-order per topic. Each topic
//! keeps a bounded ring of recent events that is replayed to a client when it
//! (re)subscribes; older history is only reachable through the HTTP API.
//!
//! Topic state is sharded per topic (no global lock): publishing to
//! `call:{a}` never contends with `call:{b}`.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

const TOPIC_CHANNEL_CAPACITY: usize = 256;

/// Addressable topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// All call state changes.
    Calls,
    /// State changes for one call.
    Call(String),
    /// All transcript traffic.
    Transcripts,
    /// Transcript traffic for one call.
    Transcript(String),
}

impl Topic {
    pub fn call(call_sid: impl Into<String>) -> Self {
        Topic::Call(call_sid.into())
    }

    pub fn transcript(call_sid: impl Into<String>) -> Self {
        Topic::Transcript(call_sid.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Calls => write!(f, "calls"),
            Topic::Call(sid) => write!(f, "call:{sid}"),
            Topic::Transcripts => write!(f, "transcripts"),
            Topic::Transcript(sid) => write!(f, "transcript:{sid}"),
        }
    }
}

/// One published event: the server event name plus its JSON payload.
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl HubEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Wire shape sent to WebSocket clients.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.event,
            "data": self.data,
        })
    }
}

struct TopicState {
    sender: broadcast::Sender<HubEvent>,
    ring: Mutex<VecDeque<HubEvent>>,
}

impl TopicState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_CHANNEL_CAPACITY);
        Self {
            sender,
            ring: Mutex::new(VecDeque::new()),
        }
    }
}

/// Process-local pub/sub used to push state changes to UI clients.
#[derive(Clone)]
pub struct RealtimeHub {
    topics: Arc<DashMap<Topic, Arc<TopicState>>>,
    replay_depth: usize,
}

impl RealtimeHub {
    pub fn new(replay_depth: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            replay_depth,
        }
    }

    fn topic_state(&self, topic: &Topic) -> Arc<TopicState> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(TopicState::new()))
            .clone()
    }

    /// Publish one event on a topic. Publication order is preserved per
    /// topic; slow subscribers may observe lag and re-sync via replay.
    pub fn publish(&self, topic: &Topic, event: HubEvent) {
        let state = self.topic_state(topic);
        {
            let mut ring = state.ring.lock();
            if ring.len() >= self.replay_depth {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        let delivered = state.sender.send(event).unwrap_or(0);
        trace!("Published on {} to {} subscribers", topic, delivered);
    }

    /// Subscribe to a topic: the recent-event replay plus a live receiver.
    pub fn subscribe(&self, topic: &Topic) -> (Vec<HubEvent>, broadcast::Receiver<HubEvent>) {
        let state = self.topic_state(topic);
        let replay = state.ring.lock().iter().cloned().collect();
        (replay, state.sender.subscribe())
    }

    /// Drop a per-call topic once the call is finalized and its ring aged out.
    pub fn forget(&self, topic: &Topic) {
        self.topics.remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_order_delivery_per_topic() {
        let hub = RealtimeHub::new(50);
        let topic = Topic::call("CA1");
        let (_, mut rx) = hub.subscribe(&topic);

        for i in 0..5 {
            hub.publish(&topic, HubEvent::new("status_update", serde_json::json!({ "seq": i })));
        }

        for i in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.data["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_replay_is_bounded() {
        let hub = RealtimeHub::new(3);
        let topic = Topic::Transcripts;

        for i in 0..10 {
            hub.publish(&topic, HubEvent::new("transcript_update", serde_json::json!({ "seq": i })));
        }

        let (replay, _rx) = hub.subscribe(&topic);
        let seqs: Vec<i64> = replay
            .iter()
            .map(|e| e.data["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let hub = RealtimeHub::new(10);
        let (_, mut rx_a) = hub.subscribe(&Topic::call("A"));
        let (_, mut rx_b) = hub.subscribe(&Topic::call("B"));

        hub.publish(&Topic::call("A"), HubEvent::new("call_update", serde_json::json!({"sid": "A"})));

        let got = rx_a.recv().await.unwrap();
        assert_eq!(got.data["sid"], "A");
        assert!(rx_b.try_recv().is_err());
    }
}
