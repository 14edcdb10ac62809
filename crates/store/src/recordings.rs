//! Recording repository
//!
//! Recordings are created lazily when the carrier notifies; upserts
//! fingerprint on `recording_sid`.

use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::error::Result;
use crate::types::Recording;
use crate::{new_id, Store};

/// Insert payload for [`Store::upsert_recording`].
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub recording_sid: String,
    pub call_sid: String,
    pub status: String,
    pub url: Option<String>,
    pub duration_secs: Option<i64>,
    pub channels: i64,
}

impl Recording {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(Recording {
            id: row.try_get("id")?,
            recording_sid: row.try_get("recording_sid")?,
            call_sid: row.try_get("call_sid")?,
            status: row.try_get("status")?,
            url: row.try_get("url")?,
            duration_secs: row.try_get("duration_secs")?,
            channels: row.try_get("channels")?,
            processing_status: row.try_get("processing_status")?,
            transcription_status: row.try_get("transcription_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const RECORDING_COLUMNS: &str = "id, recording_sid, call_sid, status, url, duration_secs, \
     channels, processing_status, transcription_status, created_at, updated_at";

impl Store {
    /// Idempotent upsert fingerprinted on `recording_sid`.
    pub async fn upsert_recording(&self, rec: &NewRecording) -> Result<Recording> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO recordings (id, recording_sid, call_sid, status, url, duration_secs, \
                                     channels, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(recording_sid) DO UPDATE SET
                status = excluded.status,
                url = COALESCE(excluded.url, recordings.url),
                duration_secs = COALESCE(excluded.duration_secs, recordings.duration_secs),
                updated_at = excluded.updated_at",
        )
        .bind(new_id())
        .bind(&rec.recording_sid)
        .bind(&rec.call_sid)
        .bind(&rec.status)
        .bind(&rec.url)
        .bind(rec.duration_secs)
        .bind(rec.channels)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Upserted recording {} for call {}", rec.recording_sid, rec.call_sid);

        let row = sqlx::query(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE recording_sid = ?"
        ))
        .bind(&rec.recording_sid)
        .fetch_one(&self.pool)
        .await?;
        Recording::from_row(&row)
    }

    pub async fn get_recording(&self, recording_sid: &str) -> Result<Option<Recording>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE recording_sid = ?"
        ))
        .bind(recording_sid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Recording::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn set_recording_processing_status(
        &self,
        recording_sid: &str,
        processing_status: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE recordings SET processing_status = ?, updated_at = ? WHERE recording_sid = ?",
        )
        .bind(processing_status)
        .bind(Utc::now())
        .bind(recording_sid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recordings_for_call(&self, call_sid: &str) -> Result<Vec<Recording>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE call_sid = ? ORDER BY created_at ASC"
        ))
        .bind(call_sid)
        .fetch_all(&self.pool)
        .await?;

        let mut recordings = Vec::with_capacity(rows.len());
        for row in rows {
            recordings.push(Recording::from_row(&row)?);
        }
        Ok(recordings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_recording_converges() {
        let store = Store::new_in_memory().await.unwrap();

        let mut rec = NewRecording {
            recording_sid: "RE100".to_string(),
            call_sid: "CA100".to_string(),
            status: "processing".to_string(),
            url: None,
            duration_secs: None,
            channels: 1,
        };
        let first = store.upsert_recording(&rec).await.unwrap();

        rec.status = "completed".to_string();
        rec.url = Some("https://carrier.example/RE100".to_string());
        rec.duration_secs = Some(42);
        let second = store.upsert_recording(&rec).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, "completed");
        assert_eq!(second.duration_secs, Some(42));

        let for_call = store.recordings_for_call("CA100").await.unwrap();
        assert_eq!(for_call.len(), 1);
    }
}
