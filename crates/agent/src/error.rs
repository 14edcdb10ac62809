//! Agent adapter error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Session socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Session open timed out after {0:?}")]
    OpenTimeout(std::time::Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
