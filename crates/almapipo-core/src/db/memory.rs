//! In-memory ledger and archive
//!
//! Same semantics as the PostgreSQL store, kept behind one mutex. Nothing is
//! persisted; the orchestrator tests run against it.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use almapipo_common::types::{Action, EntryStatus, Job, RecordId, SourceLine, StatusCounts};

use super::{JobStore, RecordArchive, StatusLedger, StoreError, StoreResult};

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub job: Job,
    pub record_id: RecordId,
    pub action: Action,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    job: Job,
    record_id: RecordId,
    payload: String,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<LedgerEntry>,
    fetched: Vec<Snapshot>,
    sent: Vec<Snapshot>,
    responses: Vec<Snapshot>,
    source_lines: Vec<(Job, serde_json::Value)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All ledger entries in insertion order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().entries.clone()
    }

    pub fn status_of(&self, record_id: &RecordId, action: Action, job: Job) -> Option<EntryStatus> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.job == job && &e.record_id == record_id && e.action == action)
            .map(|e| e.status)
    }

    pub fn fetched_payloads(&self, record_id: &RecordId, job: Job) -> Vec<String> {
        select(&self.lock().fetched, record_id, job)
    }

    pub fn sent_payloads(&self, record_id: &RecordId, job: Job) -> Vec<String> {
        select(&self.lock().sent, record_id, job)
    }

    pub fn response_payloads(&self, record_id: &RecordId, job: Job) -> Vec<String> {
        select(&self.lock().responses, record_id, job)
    }

    pub fn source_lines(&self, job: Job) -> Vec<serde_json::Value> {
        self.lock()
            .source_lines
            .iter()
            .filter(|(j, _)| *j == job)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

fn select(snapshots: &[Snapshot], record_id: &RecordId, job: Job) -> Vec<String> {
    snapshots
        .iter()
        .filter(|s| s.job == job && &s.record_id == record_id)
        .map(|s| s.payload.clone())
        .collect()
}

fn snapshot(record_id: &RecordId, payload: &str, job: Job) -> Snapshot {
    Snapshot {
        job,
        record_id: record_id.clone(),
        payload: payload.to_string(),
    }
}

#[async_trait]
impl StatusLedger for MemoryStore {
    async fn record_new(&self, record_id: &RecordId, action: Action, job: Job) -> StoreResult<()> {
        let mut state = self.lock();
        let exists = state
            .entries
            .iter()
            .any(|e| e.job == job && &e.record_id == record_id && e.action == action);
        if exists {
            return Err(StoreError::duplicate(record_id, action, job));
        }

        state.entries.push(LedgerEntry {
            job,
            record_id: record_id.clone(),
            action,
            status: EntryStatus::New,
        });
        Ok(())
    }

    async fn set_status(
        &self,
        status: EntryStatus,
        record_id: &RecordId,
        action: Action,
        job: Job,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let mut matching: Vec<&mut LedgerEntry> = state
            .entries
            .iter_mut()
            .filter(|e| {
                e.job == job
                    && &e.record_id == record_id
                    && e.action == action
                    && e.status == EntryStatus::New
            })
            .collect();

        match matching.as_mut_slice() {
            [entry] => {
                entry.status = status;
                Ok(())
            },
            other => Err(StoreError::invariant(
                other.len() as u64,
                record_id,
                action,
                job,
            )),
        }
    }

    async fn list_identifiers(
        &self,
        status: EntryStatus,
        action: Action,
        job: Job,
    ) -> StoreResult<Vec<RecordId>> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|e| e.job == job && e.action == action && e.status == status)
            .map(|e| e.record_id.clone())
            .collect())
    }

    async fn count_by_status(&self, action: Action, job: Job) -> StoreResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for entry in self
            .lock()
            .entries
            .iter()
            .filter(|e| e.job == job && e.action == action)
        {
            counts.add(entry.status, 1);
        }
        Ok(counts)
    }
}

#[async_trait]
impl RecordArchive for MemoryStore {
    async fn save_fetched(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        self.lock().fetched.push(snapshot(record_id, payload, job));
        Ok(())
    }

    async fn save_sent(&self, record_id: &RecordId, payload: &str, job: Job) -> StoreResult<()> {
        self.lock().sent.push(snapshot(record_id, payload, job));
        Ok(())
    }

    async fn save_response(
        &self,
        record_id: &RecordId,
        payload: &str,
        job: Job,
    ) -> StoreResult<()> {
        self.lock().responses.push(snapshot(record_id, payload, job));
        Ok(())
    }

    async fn save_source_line(&self, line: &SourceLine, job: Job) -> StoreResult<()> {
        self.lock().source_lines.push((job, line.to_json()));
        Ok(())
    }

    async fn most_recent_fetched(&self, record_id: &RecordId) -> StoreResult<Option<String>> {
        // max_by_key keeps the last of equal keys, i.e. the latest insert of a job
        Ok(self
            .lock()
            .fetched
            .iter()
            .filter(|s| &s.record_id == record_id)
            .max_by_key(|s| s.job)
            .map(|s| s.payload.clone()))
    }

    async fn exists_sent_and_response(&self, record_id: &RecordId, job: Job) -> StoreResult<bool> {
        let state = self.lock();
        let matches = |s: &Snapshot| s.job == job && &s.record_id == record_id;
        Ok(state.sent.iter().any(matches) && state.responses.iter().any(matches))
    }

    async fn sent_and_response(
        &self,
        record_id: &RecordId,
        job: Job,
    ) -> StoreResult<Option<(String, String)>> {
        let state = self.lock();
        let matches = |s: &&Snapshot| s.job == job && &s.record_id == record_id;
        let sent = state.sent.iter().rev().find(matches);
        let response = state.responses.iter().rev().find(matches);
        Ok(sent
            .zip(response)
            .map(|(s, r)| (s.payload.clone(), r.payload.clone())))
    }
}

#[async_trait]
impl JobStore for MemoryStore {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn id(s: &str) -> RecordId {
        s.parse().unwrap()
    }

    fn job_at(offset_secs: i64) -> Job {
        Job::from_timestamp(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn test_record_new_rejects_duplicate_triple() {
        let store = MemoryStore::new();
        let job = job_at(0);
        store.record_new(&id("991"), Action::Get, job).await.unwrap();

        let err = store.record_new(&id("991"), Action::Get, job).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        // Other action and other job are separate entries
        store.record_new(&id("991"), Action::Delete, job).await.unwrap();
        store.record_new(&id("991"), Action::Get, job_at(1)).await.unwrap();
        assert_eq!(store.entries().len(), 3);
    }

    #[tokio::test]
    async fn test_set_status_is_final() {
        let store = MemoryStore::new();
        let job = job_at(0);
        store.record_new(&id("991"), Action::Put, job).await.unwrap();
        store
            .set_status(EntryStatus::Done, &id("991"), Action::Put, job)
            .await
            .unwrap();

        let err = store
            .set_status(EntryStatus::Error, &id("991"), Action::Put, job)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { matched: 0, .. }));
        assert_eq!(
            store.status_of(&id("991"), Action::Put, job),
            Some(EntryStatus::Done)
        );
    }

    #[tokio::test]
    async fn test_set_status_without_entry_fails() {
        let store = MemoryStore::new();
        let result = store
            .set_status(EntryStatus::Done, &id("991"), Action::Get, job_at(0))
            .await;
        assert!(matches!(result, Err(StoreError::InvariantViolation { .. })));
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let store = MemoryStore::new();
        let job = job_at(0);
        for key in ["1", "2", "3"] {
            store.record_new(&id(key), Action::Get, job).await.unwrap();
        }
        store.set_status(EntryStatus::Done, &id("1"), Action::Get, job).await.unwrap();
        store.set_status(EntryStatus::Error, &id("2"), Action::Get, job).await.unwrap();

        assert_eq!(
            store.list_identifiers(EntryStatus::New, Action::Get, job).await.unwrap(),
            vec![id("3")]
        );
        assert_eq!(
            store.count_by_status(Action::Get, job).await.unwrap(),
            StatusCounts::new(1, 1, 1)
        );
        assert_eq!(
            store.count_by_status(Action::Delete, job).await.unwrap(),
            StatusCounts::default()
        );
    }

    #[tokio::test]
    async fn test_most_recent_fetched_uses_latest_job() {
        let store = MemoryStore::new();
        // Archived out of order on purpose
        store.save_fetched(&id("X"), "<p2/>", job_at(10)).await.unwrap();
        store.save_fetched(&id("X"), "<p1/>", job_at(0)).await.unwrap();
        store.save_fetched(&id("Y"), "<y/>", job_at(20)).await.unwrap();

        assert_eq!(
            store.most_recent_fetched(&id("X")).await.unwrap().as_deref(),
            Some("<p2/>")
        );
        assert_eq!(store.most_recent_fetched(&id("Z")).await.unwrap(), None);
        assert_eq!(store.fetched_payloads(&id("X"), job_at(0)), vec!["<p1/>"]);
    }

    #[tokio::test]
    async fn test_sent_and_response_requires_both() {
        let store = MemoryStore::new();
        let job = job_at(0);
        store.save_sent(&id("A"), "<a/>", job).await.unwrap();
        assert!(!store.exists_sent_and_response(&id("A"), job).await.unwrap());
        assert_eq!(store.sent_and_response(&id("A"), job).await.unwrap(), None);

        store.save_response(&id("A"), "<r/>", job).await.unwrap();
        assert!(store.exists_sent_and_response(&id("A"), job).await.unwrap());
        assert_eq!(
            store.sent_and_response(&id("A"), job).await.unwrap(),
            Some(("<a/>".to_string(), "<r/>".to_string()))
        );
    }

    #[tokio::test]
    async fn test_commit_exchange_finishes_entry() {
        let store = MemoryStore::new();
        let job = job_at(0);
        store.record_new(&id("A"), Action::Post, job).await.unwrap();
        store
            .commit_exchange(&id("A"), Action::Post, "<s/>", "<r/>", EntryStatus::Done, job)
            .await
            .unwrap();

        assert_eq!(store.status_of(&id("A"), Action::Post, job), Some(EntryStatus::Done));
        assert_eq!(store.sent_payloads(&id("A"), job), vec!["<s/>"]);
        assert_eq!(store.response_payloads(&id("A"), job), vec!["<r/>"]);
    }
}
