//! Engine configuration

use std::time::Duration;

/// Tunables for the campaign engine. All defaults match production values;
/// tests shrink the timers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum time a dial attempt may take before it counts as failed.
    pub dial_timeout: Duration,
    /// Silence on both the carrier and agent sides before the bridge reports
    /// inactivity.
    pub media_inactivity_timeout: Duration,
    /// How long to wait for the carrier to confirm `completed` after a
    /// hangup before force-finalizing the call.
    pub hangup_confirm_timeout: Duration,
    /// Budget for obtaining the signed URL and connecting the agent socket.
    pub session_open_timeout: Duration,
    /// Drain window for bridge sockets after termination.
    pub bridge_drain_grace: Duration,
    /// Time existing calls get to finalize on process shutdown.
    pub shutdown_grace: Duration,
    /// Calls shorter than this with a non-human answer classify as
    /// system-terminated.
    pub short_call_threshold: Duration,
    /// Typewriter presentation cadence.
    pub typewriter: TypewriterConfig,
    /// Events replayed to a client when it (re)subscribes to a hub topic.
    pub hub_replay_depth: usize,
}

#[derive(Debug, Clone)]
pub struct TypewriterConfig {
    /// Characters appended per chunk.
    pub chunk_size: usize,
    /// Delay between chunks.
    pub interval: Duration,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3,
            interval: Duration::from_millis(40),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(15),
            media_inactivity_timeout: Duration::from_secs(60),
            hangup_confirm_timeout: Duration::from_secs(10),
            session_open_timeout: Duration::from_secs(5),
            bridge_drain_grace: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(30),
            short_call_threshold: Duration::from_secs(5),
            typewriter: TypewriterConfig::default(),
            hub_replay_depth: 50,
        }
    }
}

impl EngineConfig {
    /// Shrunk timers for tests.
    pub fn for_tests() -> Self {
        Self {
            dial_timeout: Duration::from_millis(500),
            media_inactivity_timeout: Duration::from_millis(200),
            hangup_confirm_timeout: Duration::from_millis(150),
            session_open_timeout: Duration::from_millis(200),
            bridge_drain_grace: Duration::from_millis(50),
            shutdown_grace: Duration::from_millis(500),
            short_call_threshold: Duration::from_secs(5),
            typewriter: TypewriterConfig {
                chunk_size: 3,
                interval: Duration::from_millis(1),
            },
            hub_replay_depth: 50,
        }
    }
}
