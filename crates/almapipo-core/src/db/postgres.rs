//! PostgreSQL ledger and archive

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use almapipo_common::types::{Action, EntryStatus, Job, RecordId, SourceLine, StatusCounts};

use super::{JobStore, RecordArchive, StatusLedger, StoreError, StoreResult};

/// Archive tables, all with the same (job_timestamp, record_id, payload) shape
#[derive(Debug, Clone, Copy)]
enum Snapshot {
    Fetched,
    Sent,
    Response,
}

impl Snapshot {
    fn table(self) -> &'static str {
        match self {
            Snapshot::Fetched => "fetched_records",
            Snapshot::Sent => "sent_records",
            Snapshot::Response => "put_post_responses",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_snapshot<'c, E>(
    executor: E,
    snapshot: Snapshot,
    record_id: &RecordId,
    payload: &str,
    job: Job,
) -> StoreResult<()>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO {} (job_timestamp, record_id, payload) VALUES ($1, $2, $3)",
        snapshot.table()
    );

    sqlx::query(&sql)
        .bind(job.timestamp())
        .bind(record_id.key())
        .bind(payload)
        .execute(executor)
        .await?;

    Ok(())
}

async fn update_status<'c, E>(
    executor: E,
    status: EntryStatus,
    record_id: &RecordId,
    action: Action,
    job: Job,
) -> StoreResult<()>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    // Only `new` entries may move, which also keeps final states final
    let result = sqlx::query(
        r#"
        UPDATE job_status_per_id
        SET job_status = $1
        WHERE job_timestamp = $2
          AND record_id = $3
          AND job_action = $4
          AND job_status = 'new'
        "#,
    )
    .bind(status.as_str())
    .bind(job.timestamp())
    .bind(record_id.key())
    .bind(action.as_str())
    .execute(executor)
    .await?;

    match result.rows_affected() {
        1 => Ok(()),
        matched => Err(StoreError::invariant(matched, record_id, action, job)),
    }
}

#[async_trait]
impl StatusLedger for PgStore {
    async fn record_new(&self, record_id: &RecordId, action: Action, job: Job) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_status_per_id (job_timestamp, record_id, job_action, job_status)
            VALUES ($1, $2, $3, 'new')
            "#,
        )
        .bind(job.timestamp())
        .bind(record_id.key())
        .bind(action.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::duplicate(record_id, action, job))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn set_status(
        &self,
        status: EntryStatus,
        record_id: &RecordId,
        action: Action,
        job: Job,
    ) -> StoreResult<()> {
        update_status(&self.pool, status, record_id, action, job).await
    }

    async fn list_identifiers(
        &self,
        status: EntryStatus,
        action: Action,
        job: Job,
    ) -> StoreResult<Vec<RecordId>> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT record_id
            FROM job_status_per_id
            WHERE job_timestamp = $1 AND job_action = $2 AND job_status = $3
            ORDER BY id
            "#,
        )
        .bind(job.timestamp())
        .bind(action.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        keys.iter()
            .map(|key| {
                key.parse::<RecordId>()
                    .map_err(|e| StoreError::InvalidRow(e.to_string()))
            })
            .collect()
    }

    async fn count_by_status(&self, action: Action, job: Job) -> StoreResult<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT job_status, COUNT(*)
            FROM job_status_per_id
            WHERE job_timestamp = $1 AND job_action = $2
            GROUP BY job_status
            "#,
        )
        .bind(job.timestamp())
        .bind(action.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let status: EntryStatus = status
                .parse()
                .map_err(|e: almapipo_common::PipoError| StoreError::InvalidRow(e.to_string()))?;
            counts.add(status, count);
        }

        Ok(counts)
    }
}

#[async_trait]
impl RecordArchive for PgStore {
    async fn save_fetched(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        insert_snapshot(&self.pool, Snapshot::Fetched, record_id, payload, job).await
    }

    async fn save_sent(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        insert_snapshot(&self.pool, Snapshot::Sent, record_id, payload, job).await
    }

    async fn save_response(
        &self,
        record_id: &RecordId,
        payload: &str,
        job: Job,
    ) -> StoreResult<()> {
        insert_snapshot(&self.pool, Snapshot::Response, record_id, payload, job).await
    }

    async fn save_source_line(&self, line: &SourceLine, job: Job) -> StoreResult<()> {
        // Bound as text so the column order of the input survives
        sqlx::query("INSERT INTO source_lines (job_timestamp, line) VALUES ($1, $2::json)")
            .bind(job.timestamp())
            .bind(line.to_json().to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn most_recent_fetched(&self, record_id: &RecordId) -> StoreResult<Option<String>> {
        let payload = sqlx::query_scalar(
            r#"
            SELECT payload
            FROM fetched_records
            WHERE record_id = $1
            ORDER BY job_timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(record_id.key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(payload)
    }

    async fn exists_sent_and_response(&self, record_id: &RecordId, job: Job) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sent_records WHERE job_timestamp = $1 AND record_id = $2
            ) AND EXISTS (
                SELECT 1 FROM put_post_responses WHERE job_timestamp = $1 AND record_id = $2
            )
            "#,
        )
        .bind(job.timestamp())
        .bind(record_id.key())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn sent_and_response(
        &self,
        record_id: &RecordId,
        job: Job,
    ) -> StoreResult<Option<(String, String)>> {
        let pair = sqlx::query_as(
            r#"
            SELECT s.payload, r.payload
            FROM sent_records s
            JOIN put_post_responses r
              ON r.job_timestamp = s.job_timestamp AND r.record_id = s.record_id
            WHERE s.job_timestamp = $1 AND s.record_id = $2
            ORDER BY s.id DESC, r.id DESC
            LIMIT 1
            "#,
        )
        .bind(job.timestamp())
        .bind(record_id.key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(pair)
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn commit_fetched(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_snapshot(&mut *tx, Snapshot::Fetched, record_id, payload, job).await?;
        update_status(&mut *tx, EntryStatus::Done, record_id, Action::Get, job).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_exchange(
        &self,
        record_id: &RecordId,
        action: Action,
        sent: &str,
        response: &str,
        status: EntryStatus,
        job: Job,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_snapshot(&mut *tx, Snapshot::Sent, record_id, sent, job).await?;
        insert_snapshot(&mut *tx, Snapshot::Response, record_id, response, job).await?;
        update_status(&mut *tx, status, record_id, action, job).await?;
        tx.commit().await?;
        Ok(())
    }
}
