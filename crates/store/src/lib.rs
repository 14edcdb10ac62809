//! # Dialflow Store (sqlx + SQLite)
//!
//! Durable persistence for the campaign engine: contacts, campaigns, calls,
//! recordings, transcript messages, and call events. Built on sqlx with
//! SQLite for a fully async, Send-safe interface.
//!
//! ## Key Properties
//!
//! - **Idempotent upserts**: calls fingerprint on `call_sid`, recordings on
//!   `recording_sid`, contacts on `phone_number`; concurrent upserts for the
//!   same key serialize and converge on one row.
//! - **Atomic transcript sequencing**: `append_transcript_message` allocates
//!   the next per-call sequence inside a transaction, at-most-once per
//!   `(call_sid, source, external_id)` when an external id is present.
//! - **Cascade deletes**: removing a call removes its recordings, transcript,
//!   and events in a single transaction; no orphans survive a partial failure.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dialflow_store::Store;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Store::new("sqlite:dialflow.db").await?;
//!
//! // All operations are Send-safe and can be used in tokio::spawn
//! tokio::spawn(async move {
//!     let calls = store.list_calls(Default::default()).await?;
//!     println!("Found {} calls", calls.items.len());
//!     anyhow::Ok(())
//! });
//! # Ok(())
//! # }
//! ```

pub mod calls;
pub mod campaigns;
pub mod contacts;
pub mod error;
pub mod events;
pub mod recordings;
pub mod transcripts;
pub mod types;

pub use error::{Result, StoreError};
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Main store handle. Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("🗄️ Initializing store: {}", database_url);

        // Pooled connections would each see their own private in-memory
        // database; route memory URLs through the single-connection path.
        if database_url.contains(":memory:") {
            return Self::new_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Store initialized");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing.
    pub async fn new_in_memory() -> Result<Self> {
        // A single connection keeps the in-memory database alive and shared.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Paged query result.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn empty(page: u32, limit: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            limit,
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
