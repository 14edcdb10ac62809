//! Call repository
//!
//! Calls fingerprint on the carrier-assigned `call_sid`. Upserts are
//! idempotent; concurrent upserts for the same sid serialize on the unique
//! index and converge on a single row. Termination fields (`terminated_by`,
//! `termination_reason`) are write-once, guarded in SQL.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::types::{AnsweredBy, Call, CallStatus, TerminatedBy};
use crate::{new_id, Page, Store};

/// Insert payload for [`Store::upsert_call`].
#[derive(Debug, Clone)]
pub struct NewCall {
    pub call_sid: String,
    pub conversation_id: Option<String>,
    pub campaign_id: Option<String>,
    pub contact_id: Option<String>,
    pub from_number: String,
    pub to_number: String,
    pub direction: String,
    pub status: CallStatus,
    pub attempt_number: i64,
}

impl NewCall {
    pub fn outbound(call_sid: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            conversation_id: None,
            campaign_id: None,
            contact_id: None,
            from_number: from.into(),
            to_number: to.into(),
            direction: "outbound".to_string(),
            status: CallStatus::Queued,
            attempt_number: 1,
        }
    }
}

/// Filters for [`Store::list_calls`].
#[derive(Debug, Clone, Default)]
pub struct CallQuery {
    pub status: Option<CallStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub campaign_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Terminal update applied when a call finalizes.
#[derive(Debug, Clone)]
pub struct CallFinalization {
    pub status: CallStatus,
    pub end_time: DateTime<Utc>,
    pub duration_secs: Option<i64>,
    pub billable_duration_secs: Option<i64>,
    pub terminated_by: TerminatedBy,
    pub termination_reason: String,
}

impl Call {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let answered_by: Option<String> = row.try_get("answered_by")?;
        let terminated_by: Option<String> = row.try_get("terminated_by")?;
        Ok(Call {
            id: row.try_get("id")?,
            call_sid: row.try_get("call_sid")?,
            conversation_id: row.try_get("conversation_id")?,
            campaign_id: row.try_get("campaign_id")?,
            contact_id: row.try_get("contact_id")?,
            from_number: row.try_get("from_number")?,
            to_number: row.try_get("to_number")?,
            direction: row.try_get("direction")?,
            status: CallStatus::parse(&status)
                .ok_or_else(|| StoreError::validation(format!("bad call status: {status}")))?,
            answered_by: answered_by.as_deref().and_then(AnsweredBy::parse),
            start_time: row.try_get("start_time")?,
            answer_time: row.try_get("answer_time")?,
            end_time: row.try_get("end_time")?,
            duration_secs: row.try_get("duration_secs")?,
            billable_duration_secs: row.try_get("billable_duration_secs")?,
            terminated_by: terminated_by.as_deref().and_then(TerminatedBy::parse),
            termination_reason: row.try_get("termination_reason")?,
            attempt_number: row.try_get("attempt_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const CALL_COLUMNS: &str = "id, call_sid, conversation_id, campaign_id, contact_id, from_number, \
     to_number, direction, status, answered_by, start_time, answer_time, end_time, duration_secs, \
     billable_duration_secs, terminated_by, termination_reason, attempt_number, created_at, updated_at";

impl Store {
    /// Idempotent upsert fingerprinted on `call_sid`.
    ///
    /// A second upsert with the same payload converges on the same row and
    /// never resets lifecycle fields already written by the state machine.
    pub async fn upsert_call(&self, new_call: &NewCall) -> Result<Call> {
        let now = Utc::now();
        let id = new_id();

        sqlx::query(
            "INSERT INTO calls (id, call_sid, conversation_id, campaign_id, contact_id, \
                                from_number, to_number, direction, status, attempt_number, \
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(call_sid) DO UPDATE SET
                conversation_id = COALESCE(calls.conversation_id, excluded.conversation_id),
                campaign_id = COALESCE(calls.campaign_id, excluded.campaign_id),
                contact_id = COALESCE(calls.contact_id, excluded.contact_id),
                updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&new_call.call_sid)
        .bind(&new_call.conversation_id)
        .bind(&new_call.campaign_id)
        .bind(&new_call.contact_id)
        .bind(&new_call.from_number)
        .bind(&new_call.to_number)
        .bind(&new_call.direction)
        .bind(new_call.status.as_str())
        .bind(new_call.attempt_number)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Upserted call {}", new_call.call_sid);
        self.require_call(&new_call.call_sid).await
    }

    pub async fn get_call(&self, call_sid: &str) -> Result<Option<Call>> {
        let row = sqlx::query(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE call_sid = ?"
        ))
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Call::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Correlate an agent-side conversation back to its call.
    pub async fn get_call_by_conversation_id(&self, conversation_id: &str) -> Result<Option<Call>> {
        let row = sqlx::query(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE conversation_id = ?"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Call::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn require_call(&self, call_sid: &str) -> Result<Call> {
        self.get_call(call_sid)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("call {call_sid}")))
    }

    /// Update the lifecycle status of a call.
    ///
    /// A call that already holds a terminal status never transitions again;
    /// a conflicting write returns [`StoreError::Conflict`] and leaves the
    /// row untouched.
    pub async fn update_call_status(&self, call_sid: &str, status: CallStatus) -> Result<Call> {
        let current = self.require_call(call_sid).await?;
        if current.status.is_terminal() && current.status != status {
            return Err(StoreError::conflict(format!(
                "call {call_sid} already terminal ({})",
                current.status.as_str()
            )));
        }

        sqlx::query("UPDATE calls SET status = ?, updated_at = ? WHERE call_sid = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(call_sid)
            .execute(&self.pool)
            .await?;

        self.require_call(call_sid).await
    }

    /// Record the agent-side conversation id as soon as it is known, so later
    /// webhooks can be correlated even if the session dies mid-call.
    pub async fn set_conversation_id(&self, call_sid: &str, conversation_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE calls SET conversation_id = ?, updated_at = ? WHERE call_sid = ?",
        )
        .bind(conversation_id)
        .bind(Utc::now())
        .bind(call_sid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("set_conversation_id for unknown call {}", call_sid);
        }
        Ok(())
    }

    pub async fn set_answered_by(&self, call_sid: &str, answered_by: AnsweredBy) -> Result<()> {
        sqlx::query("UPDATE calls SET answered_by = ?, updated_at = ? WHERE call_sid = ?")
            .bind(answered_by.as_str())
            .bind(Utc::now())
            .bind(call_sid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_call_started(&self, call_sid: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE calls SET start_time = COALESCE(start_time, ?), updated_at = ? WHERE call_sid = ?",
        )
        .bind(at)
        .bind(Utc::now())
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_call_answered(&self, call_sid: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE calls SET answer_time = COALESCE(answer_time, ?), updated_at = ? WHERE call_sid = ?",
        )
        .bind(at)
        .bind(Utc::now())
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply the terminal update for a call.
    ///
    /// `terminated_by` / `termination_reason` are written at most once: the
    /// `COALESCE` guard keeps the first cause and ignores later writers, so a
    /// replayed finalization converges instead of flapping.
    pub async fn finalize_call(&self, call_sid: &str, fin: &CallFinalization) -> Result<Call> {
        let current = self.require_call(call_sid).await?;
        if current.status.is_terminal() && current.status != fin.status {
            return Err(StoreError::conflict(format!(
                "call {call_sid} already finalized as {}",
                current.status.as_str()
            )));
        }

        sqlx::query(
            "UPDATE calls SET
                status = ?,
                end_time = COALESCE(end_time, ?),
                duration_secs = COALESCE(duration_secs, ?),
                billable_duration_secs = COALESCE(billable_duration_secs, ?),
                terminated_by = COALESCE(terminated_by, ?),
                termination_reason = COALESCE(termination_reason, ?),
                updated_at = ?
             WHERE call_sid = ?",
        )
        .bind(fin.status.as_str())
        .bind(fin.end_time)
        .bind(fin.duration_secs)
        .bind(fin.billable_duration_secs)
        .bind(fin.terminated_by.as_str())
        .bind(&fin.termination_reason)
        .bind(Utc::now())
        .bind(call_sid)
        .execute(&self.pool)
        .await?;

        info!(
            "Call {} finalized as {} (terminated_by={})",
            call_sid,
            fin.status.as_str(),
            fin.terminated_by.as_str()
        );
        self.require_call(call_sid).await
    }

    /// List calls matching the query, newest first.
    pub async fn list_calls(&self, query: CallQuery) -> Result<Page<Call>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(50).clamp(1, 500);
        let offset = (page - 1) as i64 * limit as i64;

        let mut conditions = Vec::new();
        if query.status.is_some() {
            conditions.push("status = ?");
        }
        if query.from.is_some() {
            conditions.push("created_at >= ?");
        }
        if query.to.is_some() {
            conditions.push("created_at <= ?");
        }
        if query.campaign_id.is_some() {
            conditions.push("campaign_id = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as count FROM calls{where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        if let Some(status) = query.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(from) = query.from {
            count_query = count_query.bind(from);
        }
        if let Some(to) = query.to {
            count_query = count_query.bind(to);
        }
        if let Some(campaign_id) = &query.campaign_id {
            count_query = count_query.bind(campaign_id.clone());
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("count")?;

        let list_sql = format!(
            "SELECT {CALL_COLUMNS} FROM calls{where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(status) = query.status {
            list_query = list_query.bind(status.as_str());
        }
        if let Some(from) = query.from {
            list_query = list_query.bind(from);
        }
        if let Some(to) = query.to {
            list_query = list_query.bind(to);
        }
        if let Some(campaign_id) = &query.campaign_id {
            list_query = list_query.bind(campaign_id.clone());
        }
        let rows = list_query
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(Call::from_row(&row)?);
        }

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn calls_for_campaign(&self, campaign_id: &str) -> Result<Vec<Call>> {
        let rows = sqlx::query(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE campaign_id = ? ORDER BY created_at ASC"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let mut calls = Vec::with_capacity(rows.len());
        for row in rows {
            calls.push(Call::from_row(&row)?);
        }
        Ok(calls)
    }

    /// Distinct contacts a campaign has dialed at least once.
    pub async fn count_dialed_contacts(&self, campaign_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT contact_id) as count FROM calls \
             WHERE campaign_id = ? AND contact_id IS NOT NULL",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    /// Remove a call and everything hanging off it in one transaction.
    ///
    /// Partial failure rolls back: either the call and all of its
    /// recordings, transcript messages, and events are gone, or none are.
    pub async fn delete_call_cascade(&self, call_sid: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM call_events WHERE call_sid = ?")
            .bind(call_sid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM transcript_messages WHERE call_sid = ?")
            .bind(call_sid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recordings WHERE call_sid = ?")
            .bind(call_sid)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM calls WHERE call_sid = ?")
            .bind(call_sid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted call {} and its dependents", call_sid);
        }
        Ok(deleted)
    }
}
