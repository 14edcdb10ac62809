//! Engine error types
//!
//! Upstream and timeout failures are recovered locally: inside the engine
//! they translate to a call-state transition to `terminating` with a matching
//! reason, never a panic. Store errors are logged and the transition is
//! retried on the next incoming event.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(#[from] dialflow_store::StoreError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        EngineError::Upstream(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

impl From<dialflow_telephony::TelephonyError> for EngineError {
    fn from(err: dialflow_telephony::TelephonyError) -> Self {
        EngineError::Upstream(err.to_string())
    }
}

impl From<dialflow_agent::AgentError> for EngineError {
    fn from(err: dialflow_agent::AgentError) -> Self {
        EngineError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
