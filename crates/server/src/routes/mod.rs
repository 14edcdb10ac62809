//! HTTP API routes

pub mod calls;
pub mod campaigns;
pub mod contacts;
pub mod events;
pub mod outbound;
pub mod recordings;
