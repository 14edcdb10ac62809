//! Campaign repository
//!
//! Campaigns in `completed` or `cancelled` are terminal and never transition
//! back; a violating status write returns `StoreError::Conflict`.

use chrono::Utc;
use sqlx::Row;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::types::{Campaign, CampaignSettings, CampaignStats, CampaignStatus};
use crate::{new_id, Store};

/// Insert payload for [`Store::create_campaign`].
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub prompt: String,
    pub first_message: String,
    pub caller_id: Option<String>,
    pub region: Option<String>,
    pub contact_ids: Vec<String>,
    pub settings: CampaignSettings,
}

/// Mutable fields accepted by [`Store::update_campaign`].
#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub first_message: Option<String>,
    pub caller_id: Option<String>,
    pub contact_ids: Option<Vec<String>>,
    pub settings: Option<CampaignSettings>,
}

impl Campaign {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let contact_ids: String = row.try_get("contact_ids")?;
        let settings: String = row.try_get("settings")?;
        let placed: i64 = row.try_get("stats_placed")?;
        let completed: i64 = row.try_get("stats_completed")?;
        let answered: i64 = row.try_get("stats_answered")?;
        let failed: i64 = row.try_get("stats_failed")?;
        let total_duration: i64 = row.try_get("total_duration_secs")?;

        let avg_duration_secs = if completed > 0 {
            total_duration as f64 / completed as f64
        } else {
            0.0
        };

        Ok(Campaign {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: CampaignStatus::parse(&status)
                .ok_or_else(|| StoreError::validation(format!("bad campaign status: {status}")))?,
            prompt: row.try_get("prompt")?,
            first_message: row.try_get("first_message")?,
            caller_id: row.try_get("caller_id")?,
            region: row.try_get("region")?,
            contact_ids: serde_json::from_str(&contact_ids)?,
            settings: serde_json::from_str(&settings)?,
            stats: CampaignStats {
                placed,
                completed,
                answered,
                failed,
                avg_duration_secs,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

const CAMPAIGN_COLUMNS: &str = "id, name, status, prompt, first_message, caller_id, region, \
     contact_ids, settings, stats_placed, stats_completed, stats_answered, stats_failed, \
     total_duration_secs, created_at, updated_at, started_at, completed_at";

impl Store {
    pub async fn create_campaign(&self, new_campaign: &NewCampaign) -> Result<Campaign> {
        let id = new_id();
        let now = Utc::now();
        let contact_ids = serde_json::to_string(&new_campaign.contact_ids)?;
        let settings = serde_json::to_string(&new_campaign.settings)?;

        sqlx::query(
            "INSERT INTO campaigns (id, name, status, prompt, first_message, caller_id, region, \
                                    contact_ids, settings, created_at, updated_at)
             VALUES (?, ?, 'draft', ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_campaign.name)
        .bind(&new_campaign.prompt)
        .bind(&new_campaign.first_message)
        .bind(&new_campaign.caller_id)
        .bind(&new_campaign.region)
        .bind(&contact_ids)
        .bind(&settings)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!("Created campaign {} ({})", new_campaign.name, id);
        self.require_campaign(&id).await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Campaign::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn require_campaign(&self, id: &str) -> Result<Campaign> {
        self.get_campaign(id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("campaign {id}")))
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut campaigns = Vec::with_capacity(rows.len());
        for row in rows {
            campaigns.push(Campaign::from_row(&row)?);
        }
        Ok(campaigns)
    }

    pub async fn list_active_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status IN ('active', 'paused') \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut campaigns = Vec::with_capacity(rows.len());
        for row in rows {
            campaigns.push(Campaign::from_row(&row)?);
        }
        Ok(campaigns)
    }

    pub async fn update_campaign(&self, id: &str, update: &CampaignUpdate) -> Result<Campaign> {
        let current = self.require_campaign(id).await?;
        if current.status.is_terminal() {
            return Err(StoreError::conflict(format!(
                "campaign {id} is {} and cannot be edited",
                current.status.as_str()
            )));
        }

        let name = update.name.clone().unwrap_or(current.name);
        let prompt = update.prompt.clone().unwrap_or(current.prompt);
        let first_message = update.first_message.clone().unwrap_or(current.first_message);
        let caller_id = update.caller_id.clone().or(current.caller_id);
        let contact_ids = serde_json::to_string(
            update.contact_ids.as_ref().unwrap_or(&current.contact_ids),
        )?;
        let settings = serde_json::to_string(update.settings.as_ref().unwrap_or(&current.settings))?;

        sqlx::query(
            "UPDATE campaigns SET name = ?, prompt = ?, first_message = ?, caller_id = ?, \
             contact_ids = ?, settings = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&prompt)
        .bind(&first_message)
        .bind(&caller_id)
        .bind(&contact_ids)
        .bind(&settings)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.require_campaign(id).await
    }

    /// Transition a campaign's status, enforcing terminal-state stickiness.
    pub async fn set_campaign_status(&self, id: &str, status: CampaignStatus) -> Result<Campaign> {
        let current = self.require_campaign(id).await?;
        if current.status.is_terminal() && current.status != status {
            return Err(StoreError::conflict(format!(
                "campaign {id} already terminal ({})",
                current.status.as_str()
            )));
        }

        let now = Utc::now();
        let started_at = if status == CampaignStatus::Active && current.started_at.is_none() {
            Some(now)
        } else {
            current.started_at
        };
        let completed_at = if status.is_terminal() && current.completed_at.is_none() {
            Some(now)
        } else {
            current.completed_at
        };

        sqlx::query(
            "UPDATE campaigns SET status = ?, started_at = ?, completed_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(started_at)
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        info!("Campaign {} -> {}", id, status.as_str());
        self.require_campaign(id).await
    }

    /// Accumulate one finalized call into the campaign counters.
    pub async fn record_campaign_call(
        &self,
        id: &str,
        answered: bool,
        completed: bool,
        failed: bool,
        duration_secs: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET
                stats_completed = stats_completed + ?,
                stats_answered = stats_answered + ?,
                stats_failed = stats_failed + ?,
                total_duration_secs = total_duration_secs + ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(completed as i64)
        .bind(answered as i64)
        .bind(failed as i64)
        .bind(duration_secs)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count one placed dial attempt.
    pub async fn record_campaign_dial(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET stats_placed = stats_placed + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a campaign and cascade to its calls (and their dependents).
    pub async fn delete_campaign_cascade(&self, id: &str) -> Result<bool> {
        let calls = self.calls_for_campaign(id).await?;
        for call in &calls {
            self.delete_call_cascade(&call.call_sid).await?;
        }

        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted campaign {} and {} calls", id, calls.len());
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_campaign() -> NewCampaign {
        NewCampaign {
            name: "Spring outreach".to_string(),
            prompt: "You are a friendly outreach assistant".to_string(),
            first_message: "Hi, this is Dana".to_string(),
            caller_id: Some("+15550000000".to_string()),
            region: None,
            contact_ids: vec!["c1".to_string(), "c2".to_string()],
            settings: CampaignSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_campaign_lifecycle() {
        let store = Store::new_in_memory().await.unwrap();
        let campaign = store.create_campaign(&sample_campaign()).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);

        let active = store
            .set_campaign_status(&campaign.id, CampaignStatus::Active)
            .await
            .unwrap();
        assert!(active.started_at.is_some());

        let done = store
            .set_campaign_status(&campaign.id, CampaignStatus::Completed)
            .await
            .unwrap();
        assert!(done.completed_at.is_some());

        // Terminal campaigns never transition back
        let err = store
            .set_campaign_status(&campaign.id, CampaignStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_campaign_stats_accumulate() {
        let store = Store::new_in_memory().await.unwrap();
        let campaign = store.create_campaign(&sample_campaign()).await.unwrap();

        store.record_campaign_dial(&campaign.id).await.unwrap();
        store.record_campaign_dial(&campaign.id).await.unwrap();
        store
            .record_campaign_call(&campaign.id, true, true, false, 20)
            .await
            .unwrap();
        store
            .record_campaign_call(&campaign.id, false, false, true, 0)
            .await
            .unwrap();

        let reloaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stats.placed, 2);
        assert_eq!(reloaded.stats.completed, 1);
        assert_eq!(reloaded.stats.answered, 1);
        assert_eq!(reloaded.stats.failed, 1);
        assert!((reloaded.stats.avg_duration_secs - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_campaign_delete_cascades_to_calls() {
        let store = Store::new_in_memory().await.unwrap();
        let campaign = store.create_campaign(&sample_campaign()).await.unwrap();

        let mut call = crate::calls::NewCall::outbound("CA300", "+15550000000", "+15551110001");
        call.campaign_id = Some(campaign.id.clone());
        store.upsert_call(&call).await.unwrap();
        store
            .append_event("CA300", "status_update", serde_json::json!({}), "carrier")
            .await
            .unwrap();

        assert!(store.delete_campaign_cascade(&campaign.id).await.unwrap());
        assert!(store.get_campaign(&campaign.id).await.unwrap().is_none());
        assert!(store.get_call("CA300").await.unwrap().is_none());
        assert!(store.events_for_call("CA300").await.unwrap().is_empty());
    }
}
