//! Transcript repository
//!
//! Per-call sequences are allocated atomically inside a transaction and are
//! strictly increasing by 1 starting at 1. When an `external_id` is present
//! an append is at-most-once per `(call_sid, source, external_id)`: a
//! duplicate returns the already-persisted sequence instead of a new row.

use chrono::Utc;
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::types::{TranscriptMessage, TranscriptRole, TranscriptSource};
use crate::{new_id, Store};

/// Insert payload for [`Store::append_transcript_message`].
#[derive(Debug, Clone)]
pub struct NewTranscriptMessage {
    pub call_sid: String,
    pub role: TranscriptRole,
    pub text: String,
    pub offset_secs: Option<f64>,
    pub source: TranscriptSource,
    pub external_id: Option<String>,
}

/// One line of a finalized transcript as delivered by the agent webhook.
#[derive(Debug, Clone)]
pub struct FinalizedLine {
    pub role: TranscriptRole,
    pub text: String,
    pub offset_secs: Option<f64>,
}

impl TranscriptMessage {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let role: String = row.try_get("role")?;
        let source: String = row.try_get("source")?;
        Ok(TranscriptMessage {
            id: row.try_get("id")?,
            call_sid: row.try_get("call_sid")?,
            sequence: row.try_get("sequence")?,
            role: TranscriptRole::parse(&role)
                .ok_or_else(|| StoreError::validation(format!("bad transcript role: {role}")))?,
            text: row.try_get("text")?,
            offset_secs: row.try_get("offset_secs")?,
            source: TranscriptSource::parse(&source)
                .ok_or_else(|| StoreError::validation(format!("bad transcript source: {source}")))?,
            external_id: row.try_get("external_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Store {
    /// Append one transcript line, allocating the next per-call sequence.
    ///
    /// Returns the sequence number of the persisted message. Re-appending a
    /// message with the same `(call_sid, source, external_id)` returns the
    /// existing sequence and writes nothing.
    pub async fn append_transcript_message(&self, msg: &NewTranscriptMessage) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        if let Some(external_id) = &msg.external_id {
            let existing = sqlx::query(
                "SELECT sequence FROM transcript_messages
                 WHERE call_sid = ? AND source = ? AND external_id = ?",
            )
            .bind(&msg.call_sid)
            .bind(msg.source.as_str())
            .bind(external_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = existing {
                let sequence: i64 = row.try_get("sequence")?;
                debug!(
                    "Transcript message {} already persisted for {} (seq {})",
                    external_id, msg.call_sid, sequence
                );
                tx.rollback().await?;
                return Ok(sequence);
            }
        }

        let row = sqlx::query(
            "INSERT INTO transcript_messages
                (id, call_sid, sequence, role, text, offset_secs, source, external_id, created_at)
             VALUES (?, ?,
                (SELECT COALESCE(MAX(sequence), 0) + 1 FROM transcript_messages WHERE call_sid = ?),
                ?, ?, ?, ?, ?, ?)
             RETURNING sequence",
        )
        .bind(new_id())
        .bind(&msg.call_sid)
        .bind(&msg.call_sid)
        .bind(msg.role.as_str())
        .bind(&msg.text)
        .bind(msg.offset_secs)
        .bind(msg.source.as_str())
        .bind(&msg.external_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let sequence: i64 = row.try_get("sequence")?;
        tx.commit().await?;
        Ok(sequence)
    }

    /// Atomically swap the finalized section of a call's transcript.
    ///
    /// Realtime messages are retained for audit; existing finalized rows are
    /// replaced by the new batch in one transaction, with sequences
    /// continuing after the call's current maximum.
    pub async fn replace_finalized_transcript(
        &self,
        call_sid: &str,
        lines: &[FinalizedLine],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM transcript_messages WHERE call_sid = ? AND source = 'finalized'")
            .bind(call_sid)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) as max_seq FROM transcript_messages WHERE call_sid = ?",
        )
        .bind(call_sid)
        .fetch_one(&mut *tx)
        .await?;
        let mut sequence: i64 = row.try_get("max_seq")?;

        let now = Utc::now();
        for line in lines {
            sequence += 1;
            sqlx::query(
                "INSERT INTO transcript_messages
                    (id, call_sid, sequence, role, text, offset_secs, source, external_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, 'finalized', NULL, ?)",
            )
            .bind(new_id())
            .bind(call_sid)
            .bind(sequence)
            .bind(line.role.as_str())
            .bind(&line.text)
            .bind(line.offset_secs)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Replaced finalized transcript for {} ({} lines)",
            call_sid,
            lines.len()
        );
        Ok(lines.len())
    }

    /// Full transcript for a call, ordered by sequence.
    pub async fn transcript_for_call(&self, call_sid: &str) -> Result<Vec<TranscriptMessage>> {
        let rows = sqlx::query(
            "SELECT id, call_sid, sequence, role, text, offset_secs, source, external_id, created_at
             FROM transcript_messages WHERE call_sid = ? ORDER BY sequence ASC",
        )
        .bind(call_sid)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(TranscriptMessage::from_row(&row)?);
        }
        Ok(messages)
    }
}
