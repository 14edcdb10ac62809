//! Call event log
//!
//! Append-only; rows are never mutated and only removed by the call cascade.

use chrono::Utc;
use sqlx::Row;

use crate::error::{Result, StoreError};
use crate::types::CallEvent;
use crate::{new_id, Store};

impl CallEvent {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let payload: String = row.try_get("payload")?;
        Ok(CallEvent {
            id: row.try_get("id")?,
            call_sid: row.try_get("call_sid")?,
            event_type: row.try_get("event_type")?,
            payload: serde_json::from_str(&payload)
                .map_err(|e| StoreError::validation(format!("bad event payload: {e}")))?,
            source: row.try_get("source")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Store {
    /// Append one event to a call's log.
    pub async fn append_event(
        &self,
        call_sid: &str,
        event_type: &str,
        payload: serde_json::Value,
        source: &str,
    ) -> Result<CallEvent> {
        let id = new_id();
        let now = Utc::now();
        let payload_json = serde_json::to_string(&payload)?;

        sqlx::query(
            "INSERT INTO call_events (id, call_sid, event_type, payload, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(call_sid)
        .bind(event_type)
        .bind(&payload_json)
        .bind(source)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(CallEvent {
            id,
            call_sid: call_sid.to_string(),
            event_type: event_type.to_string(),
            payload,
            source: source.to_string(),
            created_at: now,
        })
    }

    /// Events for a call, oldest first.
    pub async fn events_for_call(&self, call_sid: &str) -> Result<Vec<CallEvent>> {
        let rows = sqlx::query(
            "SELECT id, call_sid, event_type, payload, source, created_at
             FROM call_events WHERE call_sid = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(call_sid)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(CallEvent::from_row(&row)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_ordered() {
        let store = Store::new_in_memory().await.unwrap();

        for i in 0..3 {
            store
                .append_event("CA200", "status_update", serde_json::json!({ "seq": i }), "carrier")
                .await
                .unwrap();
        }

        let events = store.events_for_call("CA200").await.unwrap();
        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.payload["seq"], i as i64);
        }
    }
}
