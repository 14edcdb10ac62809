//! Telephony error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("Carrier transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Carrier API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid carrier response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, TelephonyError>;
