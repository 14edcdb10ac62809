//! Webhook ingestor
//!
//! Two classes of inbound callback:
//!
//! - **Carrier status** — URL-encoded form, no signature (network-level
//!   auth); maps directly to a lifecycle transition and records recording
//!   notifications.
//! - **Agent transcript** — JSON with an HMAC-SHA256 signature over the raw
//!   body. Bad signatures are 401 with zero side effects. A valid payload
//!   atomically replaces the finalized transcript, records summary/sentiment
//!   when present, and publishes to the hub; it never forces termination of
//!   a call that is still in progress.

pub mod agent;
pub mod carrier;
pub mod signature;
