//! Entity types persisted by the store
//!
//! Status vocabularies serialize to the hyphenated/lowercase strings used on
//! the wire and in the database (`in-progress`, `no-answer`, `do-not-call`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contact roster entry. Phone numbers are E.164 and unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub call_count: i64,
    pub last_call_at: Option<DateTime<Utc>>,
    pub status: ContactStatus,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactStatus {
    Active,
    DoNotCall,
    Completed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Active => "active",
            ContactStatus::DoNotCall => "do-not-call",
            ContactStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ContactStatus::Active),
            "do-not-call" => Some(ContactStatus::DoNotCall),
            "completed" => Some(ContactStatus::Completed),
            _ => None,
        }
    }
}

/// An ordered batch of contacts plus the dialing policy applied to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub prompt: String,
    pub first_message: String,
    pub caller_id: Option<String>,
    pub region: Option<String>,
    pub contact_ids: Vec<String>,
    pub settings: CampaignSettings,
    pub stats: CampaignStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CampaignStatus::Draft),
            "active" => Some(CampaignStatus::Active),
            "paused" => Some(CampaignStatus::Paused),
            "completed" => Some(CampaignStatus::Completed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    /// Campaigns in `completed` or `cancelled` never transition back.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

/// Dialing policy for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSettings {
    pub max_concurrent_calls: u32,
    pub call_delay_millis: u64,
    pub retry_count: u32,
    pub retry_delay_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_window: Option<CallingWindow>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 1,
            call_delay_millis: 5_000,
            retry_count: 0,
            retry_delay_millis: 60_000,
            calling_window: None,
        }
    }
}

/// Hours-of-day window during which a campaign may dial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallingWindow {
    /// First hour (inclusive, 0-23) calls may be placed.
    pub start_hour: u8,
    /// Last hour (exclusive, 0-24) calls may be placed.
    pub end_hour: u8,
    /// Offset from UTC in minutes for the roster's local time.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl CallingWindow {
    /// Whether the given instant falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        use chrono::Timelike;
        let local = at + chrono::Duration::minutes(self.utc_offset_minutes as i64);
        let hour = local.hour() as u8;
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Window wraps midnight (e.g. 20 -> 8).
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Aggregate campaign counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStats {
    pub placed: i64,
    pub completed: i64,
    pub answered: i64,
    pub failed: i64,
    pub avg_duration_secs: f64,
}

/// One outbound dial attempt and its lifetime up to and including final status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    pub call_sid: String,
    pub conversation_id: Option<String>,
    pub campaign_id: Option<String>,
    pub contact_id: Option<String>,
    pub from_number: String,
    pub to_number: String,
    pub direction: String,
    pub status: CallStatus,
    pub answered_by: Option<AnsweredBy>,
    pub start_time: Option<DateTime<Utc>>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub billable_duration_secs: Option<i64>,
    pub terminated_by: Option<TerminatedBy>,
    pub termination_reason: Option<String>,
    pub attempt_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical carrier call statuses plus the internal `queued`/`terminating`
/// stages of the lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Terminating,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Terminating => "terminating",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Failed => "failed",
            CallStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(CallStatus::Queued),
            "initiated" => Some(CallStatus::Initiated),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" => Some(CallStatus::InProgress),
            "terminating" => Some(CallStatus::Terminating),
            "completed" => Some(CallStatus::Completed),
            "busy" => Some(CallStatus::Busy),
            "no-answer" => Some(CallStatus::NoAnswer),
            "failed" => Some(CallStatus::Failed),
            "canceled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Failed
                | CallStatus::Canceled
        )
    }

    /// Statuses that count as a failed attempt for retry purposes.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed
        )
    }
}

/// Carrier answering-machine-detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsweredBy {
    Human,
    MachineStart,
    MachineEndBeep,
    MachineEndSilence,
    MachineEndOther,
    Fax,
    Unknown,
}

impl AnsweredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnsweredBy::Human => "human",
            AnsweredBy::MachineStart => "machine_start",
            AnsweredBy::MachineEndBeep => "machine_end_beep",
            AnsweredBy::MachineEndSilence => "machine_end_silence",
            AnsweredBy::MachineEndOther => "machine_end_other",
            AnsweredBy::Fax => "fax",
            AnsweredBy::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(AnsweredBy::Human),
            "machine_start" => Some(AnsweredBy::MachineStart),
            "machine_end_beep" => Some(AnsweredBy::MachineEndBeep),
            "machine_end_silence" => Some(AnsweredBy::MachineEndSilence),
            "machine_end_other" => Some(AnsweredBy::MachineEndOther),
            "fax" => Some(AnsweredBy::Fax),
            "unknown" => Some(AnsweredBy::Unknown),
            _ => None,
        }
    }

    pub fn is_machine(&self) -> bool {
        matches!(
            self,
            AnsweredBy::MachineStart
                | AnsweredBy::MachineEndBeep
                | AnsweredBy::MachineEndSilence
                | AnsweredBy::MachineEndOther
        )
    }
}

/// The first classified cause of a call ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminatedBy {
    Agent,
    User,
    System,
    Carrier,
    Unknown,
}

impl TerminatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminatedBy::Agent => "agent",
            TerminatedBy::User => "user",
            TerminatedBy::System => "system",
            TerminatedBy::Carrier => "carrier",
            TerminatedBy::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(TerminatedBy::Agent),
            "user" => Some(TerminatedBy::User),
            "system" => Some(TerminatedBy::System),
            "carrier" => Some(TerminatedBy::Carrier),
            "unknown" => Some(TerminatedBy::Unknown),
            _ => None,
        }
    }
}

/// Carrier recording metadata. Created lazily when the carrier notifies;
/// one call may have multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub recording_sid: String,
    pub call_sid: String,
    pub status: String,
    pub url: Option<String>,
    pub duration_secs: Option<i64>,
    pub channels: i64,
    pub processing_status: Option<String>,
    pub transcription_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single line of a call's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub id: String,
    pub call_sid: String,
    pub sequence: i64,
    pub role: TranscriptRole,
    pub text: String,
    pub offset_secs: Option<f64>,
    pub source: TranscriptSource,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    Agent,
    User,
    System,
}

impl TranscriptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptRole::Agent => "agent",
            TranscriptRole::User => "user",
            TranscriptRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(TranscriptRole::Agent),
            "user" => Some(TranscriptRole::User),
            "system" => Some(TranscriptRole::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Realtime,
    Finalized,
}

impl TranscriptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::Realtime => "realtime",
            TranscriptSource::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "realtime" => Some(TranscriptSource::Realtime),
            "finalized" => Some(TranscriptSource::Finalized),
            _ => None,
        }
    }
}

/// Append-only event log entry for a call. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub id: String,
    pub call_sid: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source: String,
    pub created_at: DateTime<Utc>,
}
