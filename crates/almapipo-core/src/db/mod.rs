//! Status ledger and record archive
//!
//! The ledger tracks one entry per (job, record id, action) that moves from
//! `new` to exactly one of `done` or `error`. The archive is append-only and
//! keeps the fetched, sent and returned payloads of each job.
//!
//! Two implementations exist: [`PgStore`] backed by PostgreSQL and
//! [`MemoryStore`] used by tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use almapipo_common::types::{Action, EntryStatus, Job, RecordId, SourceLine, StatusCounts};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Ledger and archive errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// An entry for the triple was registered twice
    #[error("Entry for {record_id} {action} already exists in job {job}")]
    Duplicate {
        record_id: String,
        action: Action,
        job: Job,
    },

    /// An update matched zero or several entries, or an entry that was already final
    #[error("Expected exactly one new entry for {record_id} {action} in job {job}, matched {matched}")]
    InvariantViolation {
        matched: u64,
        record_id: String,
        action: Action,
        job: Job,
    },

    /// A stored value could not be read back
    #[error("Invalid stored value: {0}")]
    InvalidRow(String),
}

impl StoreError {
    pub fn duplicate(record_id: &RecordId, action: Action, job: Job) -> Self {
        Self::Duplicate {
            record_id: record_id.key(),
            action,
            job,
        }
    }

    pub fn invariant(matched: u64, record_id: &RecordId, action: Action, job: Job) -> Self {
        Self::InvariantViolation {
            matched,
            record_id: record_id.key(),
            action,
            job,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-job, per-record, per-action status entries
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Register a unit of work with status `new`; a second call for the same triple fails
    async fn record_new(&self, record_id: &RecordId, action: Action, job: Job) -> StoreResult<()>;

    /// Move the unique `new` entry of the triple to a final status
    async fn set_status(
        &self,
        status: EntryStatus,
        record_id: &RecordId,
        action: Action,
        job: Job,
    ) -> StoreResult<()>;

    /// Record ids with the given status, in insertion order
    async fn list_identifiers(
        &self,
        status: EntryStatus,
        action: Action,
        job: Job,
    ) -> StoreResult<Vec<RecordId>>;

    async fn count_by_status(&self, action: Action, job: Job) -> StoreResult<StatusCounts>;
}

/// Append-only payload snapshots
#[async_trait]
pub trait RecordArchive: Send + Sync {
    async fn save_fetched(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()>;

    async fn save_sent(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()>;

    async fn save_response(&self, record_id: &RecordId, payload: &str, job: Job)
        -> StoreResult<()>;

    async fn save_source_line(&self, line: &SourceLine, job: Job) -> StoreResult<()>;

    /// Fetched payload of the latest job that archived one for this record
    async fn most_recent_fetched(&self, record_id: &RecordId) -> StoreResult<Option<String>>;

    async fn exists_sent_and_response(&self, record_id: &RecordId, job: Job) -> StoreResult<bool>;

    /// Sent payload and response payload of this record in this job
    async fn sent_and_response(
        &self,
        record_id: &RecordId,
        job: Job,
    ) -> StoreResult<Option<(String, String)>>;
}

/// Ledger and archive behind one handle, with the write pairs that belong together
#[async_trait]
pub trait JobStore: StatusLedger + RecordArchive {
    /// Archive a fetched payload and mark the GET entry done
    async fn commit_fetched(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        self.save_fetched(record_id, payload, job).await?;
        self.set_status(EntryStatus::Done, record_id, Action::Get, job)
            .await
    }

    /// Archive a sent payload with its response and finish the action's entry
    async fn commit_exchange(
        &self,
        record_id: &RecordId,
        action: Action,
        sent: &str,
        response: &str,
        status: EntryStatus,
        job: Job,
    ) -> StoreResult<()> {
        self.save_sent(record_id, sent, job).await?;
        self.save_response(record_id, response, job).await?;
        self.set_status(status, record_id, action, job).await
    }
}

// ============================================================================
// Connection pool
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: crate::config::DEFAULT_DATABASE_URL.to_string(),
            max_connections: crate::config::DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: crate::config::DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: crate::config::DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: Some(crate::config::DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
        }
    }
}

pub async fn create_pool(config: &DbConfig) -> StoreResult<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> StoreResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(StoreError::from)
}

/// Apply pending migrations from `migrations/`
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
