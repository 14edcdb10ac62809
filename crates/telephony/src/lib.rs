//! # Dialflow Telephony Adapter
//!
//! Places and terminates calls against a Twilio-style carrier REST API and
//! defines the webhook payloads the carrier posts back. The rest of the
//! system talks to the carrier through the [`TelephonyPort`] trait so engine
//! tests can swap in [`MockTelephony`].
//!
//! Edge cases honored here:
//!
//! - `hangup` is idempotent: an unknown call sid or a call that already ended
//!   logs a warning and returns success.
//! - Dial options carry machine detection, recording, the media stream URL
//!   (rendered as TwiML `<Connect><Stream>`), and custom parameters echoed
//!   back on the media stream `start` frame.

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::HttpTelephonyClient;
pub use error::{Result, TelephonyError};
pub use mock::MockTelephony;
pub use types::*;

use async_trait::async_trait;

/// Carrier operations the engine depends on.
#[async_trait]
pub trait TelephonyPort: Send + Sync {
    /// Place an outbound call; returns the carrier-assigned call sid.
    async fn dial(&self, request: &DialRequest) -> Result<String>;

    /// Terminate a call. Succeeds if the call is already terminated.
    async fn hangup(&self, call_sid: &str, reason: &str) -> Result<()>;
}
