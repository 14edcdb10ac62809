//! Termination tracker
//!
//! Process-scoped, single-writer record of why each call ended. Candidate
//! causes race from multiple sources (user hangup, agent completion,
//! inactivity, system cancel, carrier failure); only the first submission
//! wins the `terminated_by` / `termination_reason` slot. Later causes are
//! kept on an audit list for forensic logging.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dialflow_store::TerminatedBy;
use std::sync::Arc;
use tracing::debug;

/// One candidate cause submission.
#[derive(Debug, Clone)]
pub struct TerminationCause {
    pub cause: TerminatedBy,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Winner plus the audit trail of losers.
#[derive(Debug, Clone)]
pub struct TerminationRecord {
    pub first: TerminationCause,
    pub subsequent: Vec<TerminationCause>,
}

/// First-writer-wins registry keyed by call sid.
#[derive(Clone, Default)]
pub struct TerminationTracker {
    records: Arc<DashMap<String, TerminationRecord>>,
}

impl TerminationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a candidate cause. Returns `true` when this submission won the
    /// first-writer slot.
    pub fn submit(&self, call_sid: &str, cause: TerminatedBy, reason: impl Into<String>) -> bool {
        let candidate = TerminationCause {
            cause,
            reason: reason.into(),
            at: Utc::now(),
        };

        // The entry API serializes racing writers per key.
        let mut won = false;
        self.records
            .entry(call_sid.to_string())
            .and_modify(|record| {
                debug!(
                    "Termination cause for {} lost race: {:?} ({}) after {:?}",
                    call_sid, candidate.cause, candidate.reason, record.first.cause
                );
                record.subsequent.push(candidate.clone());
            })
            .or_insert_with(|| {
                won = true;
                TerminationRecord {
                    first: candidate.clone(),
                    subsequent: Vec::new(),
                }
            });
        won
    }

    /// The winning cause, if any was submitted.
    pub fn first_cause(&self, call_sid: &str) -> Option<TerminationCause> {
        self.records.get(call_sid).map(|r| r.first.clone())
    }

    /// Remove and return the record once the call is finalized.
    pub fn take(&self, call_sid: &str) -> Option<TerminationRecord> {
        self.records.remove(call_sid).map(|(_, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let tracker = TerminationTracker::new();

        assert!(tracker.submit("CA1", TerminatedBy::Agent, "conversation_complete"));
        assert!(!tracker.submit("CA1", TerminatedBy::Carrier, "status_callback"));
        assert!(!tracker.submit("CA1", TerminatedBy::System, "inactivity"));

        // Losers can still observe the winner before finalization
        let first = tracker.first_cause("CA1").unwrap();
        assert_eq!(first.cause, TerminatedBy::Agent);

        let record = tracker.take("CA1").unwrap();
        assert_eq!(record.first.cause, TerminatedBy::Agent);
        assert_eq!(record.first.reason, "conversation_complete");
        assert_eq!(record.subsequent.len(), 2);

        // After take, a new lifecycle for the same sid starts clean
        assert!(tracker.submit("CA1", TerminatedBy::User, "hangup"));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_yield_one_winner() {
        let tracker = TerminationTracker::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.submit("CA2", TerminatedBy::System, format!("racer-{i}"))
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let record = tracker.take("CA2").unwrap();
        assert_eq!(record.subsequent.len(), 15);
    }
}
