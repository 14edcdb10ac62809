//! # Dialflow Engine
//!
//! The campaign execution core: drives a roster of contacts through an
//! automated conversational-AI call flow. The engine owns
//!
//! - the **campaign scheduler** deciding which campaigns run, how many
//!   concurrent calls each may hold, and when the next contact is dialed;
//! - the **call lifecycle state machine** from `queued` through `finalized`,
//!   including retries and termination-cause tracking;
//! - the per-call **media bridge** proxying audio between the carrier and
//!   the AI agent and classifying agent events;
//! - the **realtime hub** fanning state changes out to dashboards.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            CampaignScheduler             │
//! │   one dialer task per active campaign    │
//! └──────────────┬───────────────────────────┘
//!                │ StartCallRequest
//! ┌──────────────▼───────────────────────────┐
//! │         CallLifecycleManager             │◄── carrier status (webhooks)
//! │   per-call state machine + termination   │◄── BridgeSignal
//! └──────────────┬───────────────────────────┘
//!                │ Hangup / persist / publish
//! ┌──────────────▼──────────┐  ┌─────────────┐
//! │       BridgeManager     │  │ RealtimeHub │
//! │  one bridge per stream  │  │  topics     │
//! └─────────────────────────┘  └─────────────┘
//! ```
//!
//! All registries are explicitly owned: the scheduler's campaign table
//! belongs to the scheduler task, the active-call map has a single writer
//! per key, and the termination record is first-writer-wins.

pub mod bridge;
pub mod config;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod retry;
pub mod scheduler;
pub mod termination;
pub mod typewriter;

pub use bridge::{BridgeManager, BridgeSignal, BridgeStats, CarrierFrame, CarrierMessage};
pub use config::{EngineConfig, TypewriterConfig};
pub use error::{EngineError, Result};
pub use hub::{HubEvent, RealtimeHub, Topic};
pub use lifecycle::{CallLifecycleManager, LifecycleEvent, StartCallRequest};
pub use retry::RetryPolicy;
pub use scheduler::{CampaignProgress, CampaignScheduler, SchedulerHandle};
pub use termination::{TerminationCause, TerminationRecord, TerminationTracker};

/// Commonly used engine types.
pub mod prelude {
    pub use crate::bridge::{BridgeManager, BridgeSignal, CarrierFrame, CarrierMessage};
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, Result};
    pub use crate::hub::{HubEvent, RealtimeHub, Topic};
    pub use crate::lifecycle::{CallLifecycleManager, LifecycleEvent, StartCallRequest};
    pub use crate::scheduler::{CampaignProgress, CampaignScheduler, SchedulerHandle};
    pub use crate::termination::TerminationTracker;
}
