//! Contact repository
//!
//! Contacts dedup on the E.164 phone number; importing the same roster twice
//! converges on the same contact set. A contact is never deleted while an
//! active campaign references it.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::types::{Contact, ContactStatus};
use crate::{new_id, Page, Store};

/// Insert payload for [`Store::upsert_contact`].
#[derive(Debug, Clone)]
pub struct NewContact {
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub priority: i64,
}

impl NewContact {
    pub fn with_phone(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            name: None,
            email: None,
            tags: Vec::new(),
            priority: 0,
        }
    }
}

/// Filters for [`Store::list_contacts`].
#[derive(Debug, Clone, Default)]
pub struct ContactQuery {
    pub status: Option<ContactStatus>,
    pub tag: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl Contact {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let tags: String = row.try_get("tags")?;
        Ok(Contact {
            id: row.try_get("id")?,
            phone_number: row.try_get("phone_number")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            tags: serde_json::from_str(&tags)?,
            call_count: row.try_get("call_count")?,
            last_call_at: row.try_get("last_call_at")?,
            status: ContactStatus::parse(&status)
                .ok_or_else(|| StoreError::validation(format!("bad contact status: {status}")))?,
            priority: row.try_get("priority")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const CONTACT_COLUMNS: &str = "id, phone_number, name, email, tags, call_count, last_call_at, \
     status, priority, created_at, updated_at";

impl Store {
    /// Idempotent upsert deduplicated on phone number.
    pub async fn upsert_contact(&self, new_contact: &NewContact) -> Result<Contact> {
        let phone = normalize_phone(&new_contact.phone_number)?;
        let now = Utc::now();
        let tags = serde_json::to_string(&new_contact.tags)?;

        sqlx::query(
            "INSERT INTO contacts (id, phone_number, name, email, tags, priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(phone_number) DO UPDATE SET
                name = COALESCE(excluded.name, contacts.name),
                email = COALESCE(excluded.email, contacts.email),
                updated_at = excluded.updated_at",
        )
        .bind(new_id())
        .bind(&phone)
        .bind(&new_contact.name)
        .bind(&new_contact.email)
        .bind(&tags)
        .bind(new_contact.priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone_number = ?"
        ))
        .bind(&phone)
        .fetch_one(&self.pool)
        .await?;
        Contact::from_row(&row)
    }

    /// Upsert a batch of contacts and return the resulting ids in input order.
    ///
    /// Rows whose phone number fails validation are skipped, not fatal.
    pub async fn import_contacts(&self, batch: &[NewContact]) -> Result<Vec<Contact>> {
        let mut imported = Vec::with_capacity(batch.len());
        let mut skipped = 0usize;
        for new_contact in batch {
            match self.upsert_contact(new_contact).await {
                Ok(contact) => imported.push(contact),
                Err(StoreError::Validation(reason)) => {
                    debug!("Skipping contact import row: {}", reason);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        info!("Imported {} contacts ({} skipped)", imported.len(), skipped);
        Ok(imported)
    }

    pub async fn get_contact(&self, id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Contact::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_contact_by_phone(&self, phone_number: &str) -> Result<Option<Contact>> {
        let phone = normalize_phone(phone_number)?;
        let row = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone_number = ?"
        ))
        .bind(&phone)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Contact::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_contacts(&self, query: ContactQuery) -> Result<Page<Contact>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(50).clamp(1, 500);
        let offset = (page - 1) as i64 * limit as i64;

        let mut conditions = Vec::new();
        if query.status.is_some() {
            conditions.push("status = ?");
        }
        if query.tag.is_some() {
            // Tags are a JSON array of strings
            conditions.push("tags LIKE ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as count FROM contacts{where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        if let Some(status) = query.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(tag) = &query.tag {
            count_query = count_query.bind(format!("%\"{tag}\"%"));
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("count")?;

        let list_sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts{where_clause} \
             ORDER BY priority DESC, created_at ASC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(status) = query.status {
            list_query = list_query.bind(status.as_str());
        }
        if let Some(tag) = &query.tag {
            list_query = list_query.bind(format!("%\"{tag}\"%"));
        }
        let rows = list_query
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(Contact::from_row(&row)?);
        }
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn set_contact_status(&self, id: &str, status: ContactStatus) -> Result<()> {
        let result = sqlx::query("UPDATE contacts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("contact {id}")));
        }
        Ok(())
    }

    /// Bump the attempt counters after a dial.
    pub async fn record_call_attempt(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE contacts SET call_count = call_count + 1, last_call_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Minimal E.164 normalization: strip separators, require leading `+` and
/// 8-15 digits.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::validation(format!("invalid phone number: {raw}")));
    }
    if !(8..=15).contains(&digits.len()) {
        return Err(StoreError::validation(format!("invalid phone number: {raw}")));
    }
    Ok(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let store = Store::new_in_memory().await.unwrap();

        let batch = vec![
            NewContact::with_phone("+15551110001"),
            NewContact::with_phone("+15551110002"),
            NewContact::with_phone("+15551110001"), // dup within batch
        ];

        let first = store.import_contacts(&batch).await.unwrap();
        let second = store.import_contacts(&batch).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);

        // Dedup on phone: only two rows exist after both imports
        let all = store.list_contacts(Default::default()).await.unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 111-0001").unwrap(), "+15551110001");
        assert_eq!(normalize_phone("15551110001").unwrap(), "+15551110001");
        assert!(normalize_phone("not-a-phone").is_err());
        assert!(normalize_phone("+12").is_err());
    }

    #[tokio::test]
    async fn test_do_not_call_status() {
        let store = Store::new_in_memory().await.unwrap();
        let contact = store
            .upsert_contact(&NewContact::with_phone("+15551110003"))
            .await
            .unwrap();

        store
            .set_contact_status(&contact.id, ContactStatus::DoNotCall)
            .await
            .unwrap();
        let reloaded = store.get_contact(&contact.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ContactStatus::DoNotCall);
    }
}
