//! Retry policy
//!
//! Turns a campaign's settings into concrete attempt scheduling: how many
//! dials a contact may receive and how far apart they must be.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Backoff schedule for a contact's dial attempts within one campaign.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed: the first dial plus `retry_count` retries.
    pub max_attempts: u32,
    /// Minimum spacing between attempts to the same contact.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &dialflow_store::CampaignSettings) -> Self {
        Self {
            max_attempts: settings.retry_count + 1,
            retry_delay: Duration::from_millis(settings.retry_delay_millis),
        }
    }

    /// Whether another attempt may be scheduled after `attempt_number`
    /// attempts have been placed.
    pub fn allows_retry(&self, attempt_number: u32) -> bool {
        attempt_number < self.max_attempts
    }

    /// Earliest wall-clock time the next attempt may be placed.
    pub fn next_attempt_at(&self, last_attempt: DateTime<Utc>) -> DateTime<Utc> {
        last_attempt + chrono::Duration::from_std(self.retry_delay).unwrap_or_default()
    }
}
