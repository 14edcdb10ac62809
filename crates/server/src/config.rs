//! Server configuration
//!
//! Everything comes from the environment (or CLI flags in the binary):
//! carrier account/token, agent API key and webhook secret, store connection
//! string, bind address, optional region, and the public base URL the
//! carrier reaches us on.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,
    /// SQLite connection string.
    pub database_url: String,
    /// Publicly reachable base URL (https://host) used to build webhook and
    /// media-stream URLs handed to the carrier.
    pub public_base_url: String,
    /// Carrier credentials.
    pub carrier_account_sid: String,
    pub carrier_auth_token: String,
    /// Conversational-AI provider credentials.
    pub agent_api_key: String,
    pub agent_id: String,
    /// Shared secret for agent webhook signatures.
    pub agent_webhook_secret: String,
    /// Default caller id when a request does not carry one.
    pub default_caller_id: String,
    /// Optional carrier region hint.
    pub region: Option<String>,
    /// Directory for the opportunistic recording-file cache.
    pub recordings_dir: PathBuf,
}

impl ServerConfig {
    /// URL the carrier posts status callbacks to.
    pub fn carrier_webhook_url(&self) -> String {
        format!("{}/webhooks/carrier", self.public_base_url.trim_end_matches('/'))
    }

    /// WebSocket URL the carrier connects its media stream to.
    pub fn media_stream_url(&self) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        let wss = base
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{wss}/outbound-media-stream")
    }

    /// Throwaway configuration for tests.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().expect("valid addr"),
            database_url: "sqlite::memory:".to_string(),
            public_base_url: "https://test.example".to_string(),
            carrier_account_sid: "AC-test".to_string(),
            carrier_auth_token: "token-test".to_string(),
            agent_api_key: "key-test".to_string(),
            agent_id: "agent-test".to_string(),
            agent_webhook_secret: "secret-test".to_string(),
            default_caller_id: "+15550000000".to_string(),
            region: None,
            recordings_dir: std::env::temp_dir().join("dialflow-test-recordings"),
        }
    }
}
