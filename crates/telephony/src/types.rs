//! Carrier wire types
//!
//! The canonical status vocabulary and the form-encoded status callback the
//! carrier posts to us. Field names follow the carrier's PascalCase form
//! keys.

use serde::{Deserialize, Serialize};

/// Canonical carrier call statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CarrierCallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl CarrierCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierCallStatus::Queued => "queued",
            CarrierCallStatus::Initiated => "initiated",
            CarrierCallStatus::Ringing => "ringing",
            CarrierCallStatus::InProgress => "in-progress",
            CarrierCallStatus::Completed => "completed",
            CarrierCallStatus::Busy => "busy",
            CarrierCallStatus::NoAnswer => "no-answer",
            CarrierCallStatus::Failed => "failed",
            CarrierCallStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(CarrierCallStatus::Queued),
            "initiated" => Some(CarrierCallStatus::Initiated),
            "ringing" => Some(CarrierCallStatus::Ringing),
            "in-progress" => Some(CarrierCallStatus::InProgress),
            "completed" => Some(CarrierCallStatus::Completed),
            "busy" => Some(CarrierCallStatus::Busy),
            "no-answer" => Some(CarrierCallStatus::NoAnswer),
            "failed" => Some(CarrierCallStatus::Failed),
            "canceled" => Some(CarrierCallStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CarrierCallStatus::Completed
                | CarrierCallStatus::Busy
                | CarrierCallStatus::NoAnswer
                | CarrierCallStatus::Failed
                | CarrierCallStatus::Canceled
        )
    }
}

/// Machine-detection verdict delivered with the `answered` status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierAnsweredBy {
    Human,
    MachineStart,
    MachineEndBeep,
    MachineEndSilence,
    MachineEndOther,
    Fax,
    Unknown,
}

impl CarrierAnsweredBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(CarrierAnsweredBy::Human),
            "machine_start" => Some(CarrierAnsweredBy::MachineStart),
            "machine_end_beep" => Some(CarrierAnsweredBy::MachineEndBeep),
            "machine_end_silence" => Some(CarrierAnsweredBy::MachineEndSilence),
            "machine_end_other" => Some(CarrierAnsweredBy::MachineEndOther),
            "fax" => Some(CarrierAnsweredBy::Fax),
            "unknown" => Some(CarrierAnsweredBy::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierAnsweredBy::Human => "human",
            CarrierAnsweredBy::MachineStart => "machine_start",
            CarrierAnsweredBy::MachineEndBeep => "machine_end_beep",
            CarrierAnsweredBy::MachineEndSilence => "machine_end_silence",
            CarrierAnsweredBy::MachineEndOther => "machine_end_other",
            CarrierAnsweredBy::Fax => "fax",
            CarrierAnsweredBy::Unknown => "unknown",
        }
    }
}

/// Answering-machine detection options for a dial.
#[derive(Debug, Clone)]
pub struct MachineDetection {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for MachineDetection {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 30_000,
        }
    }
}

/// Everything needed to place one outbound call.
#[derive(Debug, Clone)]
pub struct DialRequest {
    pub to: String,
    pub from: String,
    pub region: Option<String>,
    pub machine_detection: Option<MachineDetection>,
    pub record: bool,
    /// WebSocket URL the carrier connects its media stream to.
    pub media_stream_url: String,
    pub status_callback_url: String,
    /// Custom parameters carried back on the media stream `start` frame.
    pub custom_parameters: Vec<(String, String)>,
}

/// Form-encoded status callback posted by the carrier.
///
/// Numeric fields arrive as strings on the form wire; accessors parse them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCallback {
    pub call_sid: String,
    pub call_status: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub answered_by: Option<String>,
    #[serde(default)]
    pub call_duration: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recording_sid: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub recording_status: Option<String>,
    #[serde(default)]
    pub recording_duration: Option<String>,
    #[serde(default)]
    pub recording_channels: Option<String>,
}

impl StatusCallback {
    pub fn status(&self) -> Option<CarrierCallStatus> {
        CarrierCallStatus::parse(&self.call_status)
    }

    pub fn answered_by(&self) -> Option<CarrierAnsweredBy> {
        self.answered_by.as_deref().and_then(CarrierAnsweredBy::parse)
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.call_duration.as_deref().and_then(|d| d.parse().ok())
    }

    pub fn recording_duration_secs(&self) -> Option<i64> {
        self.recording_duration.as_deref().and_then(|d| d.parse().ok())
    }

    pub fn recording_channels(&self) -> i64 {
        self.recording_channels
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            "initiated",
            "ringing",
            "in-progress",
            "completed",
            "busy",
            "no-answer",
            "failed",
            "canceled",
        ] {
            let parsed = CarrierCallStatus::parse(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!(CarrierCallStatus::parse("exploded").is_none());
    }

    #[test]
    fn test_callback_accessors() {
        let cb = StatusCallback {
            call_sid: "CA123".to_string(),
            call_status: "completed".to_string(),
            answered_by: Some("machine_start".to_string()),
            call_duration: Some("42".to_string()),
            ..Default::default()
        };
        assert_eq!(cb.status(), Some(CarrierCallStatus::Completed));
        assert_eq!(cb.answered_by(), Some(CarrierAnsweredBy::MachineStart));
        assert_eq!(cb.duration_secs(), Some(42));
    }
}
