//! Carrier media-stream frames
//!
//! The carrier's WebSocket speaks JSON frames tagged by `event`. Inbound we
//! see `connected`/`start`/`media`/`stop`; outbound we send `media` (agent
//! audio) and `clear` (flush buffered playback), always carrying the
//! carrier's `streamSid`.

use serde::Deserialize;
use std::collections::HashMap;

/// Frames received from the carrier media socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierFrame {
    /// Socket-level hello, before `start`.
    Connected,

    /// Stream metadata: which call this socket belongs to.
    Start { start: StartFrame },

    /// One chunk of caller audio.
    Media { media: MediaFrame },

    /// The carrier is done sending.
    Stop,

    /// Any frame type this build does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFrame {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaFrame {
    /// Base64 audio payload.
    pub payload: String,
}

impl CarrierFrame {
    /// Decode one text frame; `None` means unparseable (log and continue).
    pub fn decode(text: &str) -> Option<CarrierFrame> {
        serde_json::from_str(text).ok()
    }
}

/// Frames sent back to the carrier media socket.
#[derive(Debug, Clone)]
pub enum CarrierMessage {
    /// Agent audio for playback.
    Media { stream_sid: String, payload: String },
    /// Flush buffered playback after an interruption.
    Clear { stream_sid: String },
}

impl CarrierMessage {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CarrierMessage::Media { stream_sid, payload } => serde_json::json!({
                "event": "media",
                "streamSid": stream_sid,
                "media": { "payload": payload },
            }),
            CarrierMessage::Clear { stream_sid } => serde_json::json!({
                "event": "clear",
                "streamSid": stream_sid,
            }),
        }
    }

    pub fn to_message(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start() {
        let text = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ1","callSid":"CA1","customParameters":{"prompt":"hi"}}}"#;
        match CarrierFrame::decode(text).unwrap() {
            CarrierFrame::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(start.custom_parameters["prompt"], "hi");
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_media_and_stop() {
        let media = r#"{"event":"media","media":{"payload":"AAAA"}}"#;
        assert!(matches!(
            CarrierFrame::decode(media).unwrap(),
            CarrierFrame::Media { .. }
        ));
        let stop = r#"{"event":"stop"}"#;
        assert!(matches!(CarrierFrame::decode(stop).unwrap(), CarrierFrame::Stop));
        let mark = r#"{"event":"mark","mark":{"name":"x"}}"#;
        assert!(matches!(
            CarrierFrame::decode(mark).unwrap(),
            CarrierFrame::Unknown
        ));
    }

    #[test]
    fn test_outbound_preserves_stream_sid() {
        let json = CarrierMessage::Media {
            stream_sid: "MZ9".to_string(),
            payload: "AAAA".to_string(),
        }
        .to_json();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ9");
        assert_eq!(json["media"]["payload"], "AAAA");

        let clear = CarrierMessage::Clear {
            stream_sid: "MZ9".to_string(),
        }
        .to_json();
        assert_eq!(clear["event"], "clear");
        assert_eq!(clear["streamSid"], "MZ9");
    }
}
