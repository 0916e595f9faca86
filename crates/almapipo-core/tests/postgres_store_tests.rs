//! PostgreSQL store integration tests
//!
//! These tests start a PostgreSQL container and need Docker:
//!
//! ```bash
//! cargo test -p almapipo-core --test postgres_store_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use almapipo_common::types::{Action, EntryStatus, Job, RecordId, SourceLine, StatusCounts};
use almapipo_core::db::{self, JobStore, PgStore, RecordArchive, StatusLedger, StoreError};

struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432.tcp()).await?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        db::migrate(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }
}

fn id(s: &str) -> RecordId {
    s.parse().unwrap()
}

fn job_at(offset_secs: i64) -> Job {
    Job::from_timestamp(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(offset_secs),
    )
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_ledger_lifecycle() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    store.record_new(&id("991,221"), Action::Get, job).await?;
    store.record_new(&id("992"), Action::Get, job).await?;
    store.record_new(&id("993"), Action::Get, job).await?;
    let set = RecordId::for_set("12345")?;
    store.record_new(&set, Action::Get, job).await?;

    store.set_status(EntryStatus::Done, &id("991,221"), Action::Get, job).await?;
    store.set_status(EntryStatus::Error, &id("993"), Action::Get, job).await?;
    store.set_status(EntryStatus::Error, &set, Action::Get, job).await?;

    assert_eq!(
        store.count_by_status(Action::Get, job).await?,
        StatusCounts::new(1, 1, 2)
    );
    // Set entries read back as set keys
    assert_eq!(
        store.list_identifiers(EntryStatus::Error, Action::Get, job).await?,
        vec![id("993"), set]
    );
    assert_eq!(
        store.list_identifiers(EntryStatus::Done, Action::Get, job).await?,
        vec![id("991,221")]
    );
    assert!(store
        .list_identifiers(EntryStatus::Done, Action::Delete, job)
        .await?
        .is_empty());
    assert_eq!(
        store.count_by_status(Action::Get, job_at(1)).await?,
        StatusCounts::default()
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_duplicate_entry_rejected() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    store.record_new(&id("991"), Action::Get, job).await?;
    let err = store.record_new(&id("991"), Action::Get, job).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));

    // Other action or other job is a different entry
    store.record_new(&id("991"), Action::Delete, job).await?;
    store.record_new(&id("991"), Action::Get, job_at(1)).await?;

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_final_status_cannot_change() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    store.record_new(&id("991"), Action::Put, job).await?;
    store.set_status(EntryStatus::Error, &id("991"), Action::Put, job).await?;

    let err = store
        .set_status(EntryStatus::Done, &id("991"), Action::Put, job)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvariantViolation { matched: 0, .. }));

    let missing = store
        .set_status(EntryStatus::Done, &id("992"), Action::Put, job)
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::InvariantViolation { .. }));

    assert_eq!(
        store.count_by_status(Action::Put, job).await?,
        StatusCounts::new(0, 0, 1)
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_most_recent_fetched_across_jobs() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    // Inserted out of chronological order
    store.save_fetched(&id("991"), "<bib>new</bib>", job_at(60)).await?;
    store.save_fetched(&id("991"), "<bib>old</bib>", job_at(0)).await?;
    store.save_fetched(&id("992"), "<bib>other</bib>", job_at(120)).await?;

    assert_eq!(
        store.most_recent_fetched(&id("991")).await?.as_deref(),
        Some("<bib>new</bib>")
    );
    assert_eq!(store.most_recent_fetched(&id("993")).await?, None);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_commit_exchange_is_atomic() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    store.record_new(&id("991"), Action::Put, job).await?;
    store
        .commit_exchange(&id("991"), Action::Put, "<a/>", "<a></a>", EntryStatus::Done, job)
        .await?;

    assert!(store.exists_sent_and_response(&id("991"), job).await?);
    assert_eq!(
        store.sent_and_response(&id("991"), job).await?,
        Some(("<a/>".to_string(), "<a></a>".to_string()))
    );

    // No `new` entry to finish: nothing of the exchange may be left behind
    let err = store
        .commit_exchange(&id("992"), Action::Put, "<b/>", "<b/>", EntryStatus::Done, job)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvariantViolation { .. }));
    assert!(!store.exists_sent_and_response(&id("992"), job).await?);

    let sent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent_records WHERE record_id = $1")
        .bind("992")
        .fetch_one(&pg.pool)
        .await?;
    assert_eq!(sent, 0);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_commit_fetched_marks_done() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    store.record_new(&id("991,221"), Action::Get, job).await?;
    store.commit_fetched(&id("991,221"), "<holding/>", job).await?;

    assert_eq!(
        store.list_identifiers(EntryStatus::Done, Action::Get, job).await?,
        vec![id("991,221")]
    );
    assert_eq!(
        store.most_recent_fetched(&id("991,221")).await?.as_deref(),
        Some("<holding/>")
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_source_line_keeps_column_order() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = job_at(0);

    let line = SourceLine::new(vec![
        ("zeta".to_string(), "1".to_string()),
        ("alpha".to_string(), "2".to_string()),
    ]);
    store.save_source_line(&line, job).await?;

    let stored: String =
        sqlx::query_scalar("SELECT line::text FROM source_lines WHERE job_timestamp = $1")
            .bind(job.timestamp())
            .fetch_one(&pg.pool)
            .await?;
    assert_eq!(stored, r#"{"zeta":"1","alpha":"2"}"#);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_job_timestamp_round_trips_with_microseconds() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let store = pg.store();
    let job = Job::now();

    store.record_new(&id("991"), Action::Get, job).await?;
    assert_eq!(
        store.count_by_status(Action::Get, job).await?,
        StatusCounts::new(1, 0, 0)
    );

    db::health_check(&pg.pool).await?;
    Ok(())
}
