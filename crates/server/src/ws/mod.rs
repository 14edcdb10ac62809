//! WebSocket endpoints: the dashboard realtime channel and the carrier
//! media stream.

pub mod media;
pub mod realtime;
