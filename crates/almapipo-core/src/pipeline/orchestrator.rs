//! The per-record state machine
//!
//! For every record of a run:
//!
//! 1. Unless restoring, register `GET` and fetch the record. A failed or
//!    empty fetch marks `GET` as error and ends the record's workflow, so no
//!    entry for the follow-up action is ever created.
//! 2. `DELETE`: register, delete, finish.
//! 3. `PUT`: register, transform the fetched payload, send it, archive sent
//!    and returned payloads together with the final status.
//! 4. `POST` (restore): register, load the latest archived snapshot, send
//!    it to the parent collection, archive as for `PUT`.
//!
//! Failures of one record are logged and recorded in the ledger; the batch
//! always continues with the next record. Only store failures and resolution
//! errors abort a run.

use futures::stream::{self, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use almapipo_common::types::{Action, EntryStatus, Job, RecordId};

use super::consistency::{payloads_match, ConsistencyChecker, ConsistencyPolicy};
use super::transform::Transform;
use super::{RunReport, Workflow};
use crate::db::JobStore;
use crate::error::{CoreError, CoreResult};
use crate::input::SourceRow;
use crate::rest::{RecordClient, ResourceDescriptor, ResourceTable};

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    client: Arc<dyn RecordClient>,
    job: Job,
    concurrency: usize,
    policy: ConsistencyPolicy,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, client: Arc<dyn RecordClient>, job: Job) -> Self {
        Self {
            store,
            client,
            job,
            concurrency: 1,
            policy: ConsistencyPolicy::Advisory,
        }
    }

    /// Number of records processed at the same time; steps of one record never interleave
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_consistency(mut self, policy: ConsistencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn job(&self) -> Job {
        self.job
    }

    /// Process every row of `rows` and report counts for the workflow's actions
    pub async fn run_for_list<I>(
        &self,
        rows: I,
        api: &str,
        kind: &str,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<RunReport>
    where
        I: IntoIterator<Item = CoreResult<SourceRow>>,
    {
        let resource = self.resolve(api, kind, workflow, transform)?;
        info!(job = %self.job, api, kind, workflow = %workflow, "Run started");

        self.process_rows(rows, resource, workflow, transform).await?;
        self.summarize(&workflow.actions()).await
    }

    /// Resolve a set to its members, then process them like a list.
    ///
    /// The set itself gets a `GET` entry under [`RecordId::for_set`]. If it
    /// cannot be resolved or has no members that entry becomes `error` and no
    /// member is processed.
    pub async fn run_for_set(
        &self,
        set_id: &str,
        api: &str,
        kind: &str,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<RunReport> {
        let resource = self.resolve(api, kind, workflow, transform)?;
        let set_key = RecordId::for_set(set_id)?;
        info!(job = %self.job, set_id, api, kind, workflow = %workflow, "Set run started");

        self.store.record_new(&set_key, Action::Get, self.job).await?;

        let members = match self.client.set_members(set_id).await {
            Ok(members) if !members.is_empty() => members,
            Ok(_) => {
                warn!(set_id, "Set has no members");
                self.finish(&set_key, Action::Get, EntryStatus::Error).await?;
                return self.summarize(&workflow.actions()).await;
            },
            Err(e) => {
                error!(set_id, error = %e, "Could not resolve set members");
                self.finish(&set_key, Action::Get, EntryStatus::Error).await?;
                return self.summarize(&workflow.actions()).await;
            },
        };

        self.finish(&set_key, Action::Get, EntryStatus::Done).await?;
        info!(set_id, members = members.len(), "Processing set members");

        let rows = members.into_iter().map(|id| Ok(SourceRow::from(id)));
        self.process_rows(rows, resource, workflow, transform).await?;
        self.summarize(&workflow.actions()).await
    }

    /// Re-run every record whose `GET` or final action failed in `previous`.
    ///
    /// The records are processed under this orchestrator's job, which must
    /// differ from `previous`. Failed set entries are not records and are
    /// skipped; the set has to be run again.
    pub async fn retry_failed(
        &self,
        previous: Job,
        api: &str,
        kind: &str,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<RunReport> {
        if previous == self.job {
            return Err(CoreError::config(format!(
                "Cannot retry job {previous} within itself, start a new job"
            )));
        }

        let mut seen = HashSet::new();
        let mut failed = Vec::new();
        for action in workflow.actions() {
            for id in self
                .store
                .list_identifiers(EntryStatus::Error, action, previous)
                .await?
            {
                if let Some(set_id) = id.set_id() {
                    warn!(previous = %previous, set_id, "Set could not be resolved, run the set again instead");
                    continue;
                }
                if seen.insert(id.clone()) {
                    failed.push(id);
                }
            }
        }

        info!(previous = %previous, job = %self.job, records = failed.len(), "Retrying failed records");

        let rows = failed.into_iter().map(|id| Ok(SourceRow::from(id)));
        self.run_for_list(rows, api, kind, workflow, transform).await
    }

    /// Log and return the counts of `actions` for this job
    pub async fn summarize(&self, actions: &[Action]) -> CoreResult<RunReport> {
        let mut summaries = Vec::with_capacity(actions.len());
        for &action in actions {
            let counts = self.store.count_by_status(action, self.job).await?;
            info!(
                job = %self.job,
                action = %action,
                done = counts.done,
                error = counts.error,
                new = counts.new,
                "Run summary"
            );
            summaries.push((action, counts));
        }

        Ok(RunReport {
            job: self.job,
            summaries,
        })
    }

    fn resolve(
        &self,
        api: &str,
        kind: &str,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<&'static ResourceDescriptor> {
        let resource = ResourceTable::lookup(api, kind)?;
        for action in workflow.actions() {
            resource.ensure_supports(action)?;
        }
        if workflow == Workflow::Put && transform.is_none() {
            return Err(CoreError::MissingTransform);
        }
        Ok(resource)
    }

    async fn process_rows<I>(
        &self,
        rows: I,
        resource: &ResourceDescriptor,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<()>
    where
        I: IntoIterator<Item = CoreResult<SourceRow>>,
    {
        let mut seen: HashSet<RecordId> = HashSet::new();

        stream::iter(rows)
            .try_for_each_concurrent(self.concurrency, move |row| {
                let duplicate = !seen.insert(row.record_id.clone());
                async move {
                    if duplicate {
                        warn!(record_id = %row.record_id, "Duplicate record id in input, skipped");
                        return Ok(());
                    }
                    if let Some(line) = &row.line {
                        self.store.save_source_line(line, self.job).await?;
                    }
                    self.process(resource, &row.record_id, workflow, transform)
                        .await
                }
            })
            .await
    }

    async fn process(
        &self,
        resource: &ResourceDescriptor,
        record_id: &RecordId,
        workflow: Workflow,
        transform: Option<&dyn Transform>,
    ) -> CoreResult<()> {
        let fetched = if workflow.fetches_first() {
            match self.fetch(resource, record_id).await? {
                Some(payload) => Some(payload),
                None => return Ok(()),
            }
        } else {
            None
        };

        match (workflow, fetched, transform) {
            (Workflow::Get, _, _) => Ok(()),
            (Workflow::Delete, _, _) => self.delete(resource, record_id).await,
            (Workflow::Put, Some(payload), Some(transform)) => {
                self.update(resource, record_id, &payload, transform).await
            },
            (Workflow::Restore, _, _) => self.restore(resource, record_id).await,
            // Ruled out by `resolve` and the fetch above
            (Workflow::Put, _, _) => Err(CoreError::MissingTransform),
        }
    }

    /// GET step; `None` means the record's workflow ends here
    async fn fetch(
        &self,
        resource: &ResourceDescriptor,
        record_id: &RecordId,
    ) -> CoreResult<Option<String>> {
        self.store.record_new(record_id, Action::Get, self.job).await?;

        let Some(path) = self.record_path(resource, record_id, Action::Get, false) else {
            self.finish(record_id, Action::Get, EntryStatus::Error).await?;
            return Ok(None);
        };

        match self.client.retrieve(&path).await {
            Ok(payload) if !payload.trim().is_empty() => {
                self.store.commit_fetched(record_id, &payload, self.job).await?;
                info!(record_id = %record_id, action = "GET", "Record fetched");
                Ok(Some(payload))
            },
            Ok(_) => {
                warn!(record_id = %record_id, action = "GET", "Empty response");
                self.finish(record_id, Action::Get, EntryStatus::Error).await?;
                Ok(None)
            },
            Err(e) => {
                warn!(record_id = %record_id, action = "GET", error = %e, "Fetch failed");
                self.finish(record_id, Action::Get, EntryStatus::Error).await?;
                Ok(None)
            },
        }
    }

    async fn delete(&self, resource: &ResourceDescriptor, record_id: &RecordId) -> CoreResult<()> {
        self.store.record_new(record_id, Action::Delete, self.job).await?;

        let Some(path) = self.record_path(resource, record_id, Action::Delete, false) else {
            return self.finish(record_id, Action::Delete, EntryStatus::Error).await;
        };

        let status = match self.client.delete(&path).await {
            Ok(_) => {
                info!(record_id = %record_id, action = "DELETE", "Record deleted");
                EntryStatus::Done
            },
            Err(e) => {
                warn!(record_id = %record_id, action = "DELETE", error = %e, "Delete failed");
                EntryStatus::Error
            },
        };
        self.finish(record_id, Action::Delete, status).await
    }

    async fn update(
        &self,
        resource: &ResourceDescriptor,
        record_id: &RecordId,
        fetched: &str,
        transform: &dyn Transform,
    ) -> CoreResult<()> {
        self.store.record_new(record_id, Action::Put, self.job).await?;

        let changed = match transform.apply(record_id, fetched) {
            Some(payload) if !payload.trim().is_empty() && payload != fetched => payload,
            Some(payload) if payload == fetched => {
                warn!(record_id = %record_id, action = "PUT", "Transformation left the record unchanged, not sent");
                return self.finish(record_id, Action::Put, EntryStatus::Error).await;
            },
            _ => {
                warn!(record_id = %record_id, action = "PUT", "Transformation produced no record, not sent");
                return self.finish(record_id, Action::Put, EntryStatus::Error).await;
            },
        };

        let Some(path) = self.record_path(resource, record_id, Action::Put, false) else {
            return self.finish(record_id, Action::Put, EntryStatus::Error).await;
        };

        match self.client.update(&path, &changed).await {
            Ok(response) => {
                self.finish_exchange(record_id, Action::Put, &changed, &response)
                    .await
            },
            Err(e) => {
                warn!(record_id = %record_id, action = "PUT", error = %e, "Update failed");
                self.finish(record_id, Action::Put, EntryStatus::Error).await
            },
        }
    }

    async fn restore(&self, resource: &ResourceDescriptor, record_id: &RecordId) -> CoreResult<()> {
        self.store.record_new(record_id, Action::Post, self.job).await?;

        let Some(payload) = self.store.most_recent_fetched(record_id).await? else {
            warn!(record_id = %record_id, action = "POST", "No archived record to restore");
            return self.finish(record_id, Action::Post, EntryStatus::Error).await;
        };

        let Some(path) = self.record_path(resource, record_id, Action::Post, true) else {
            return self.finish(record_id, Action::Post, EntryStatus::Error).await;
        };

        match self.client.create(&path, &payload).await {
            Ok(response) => {
                self.finish_exchange(record_id, Action::Post, &payload, &response)
                    .await
            },
            Err(e) => {
                warn!(record_id = %record_id, action = "POST", error = %e, "Create failed");
                self.finish(record_id, Action::Post, EntryStatus::Error).await
            },
        }
    }

    /// Archive sent and returned payload and finish the entry, applying the consistency policy
    async fn finish_exchange(
        &self,
        record_id: &RecordId,
        action: Action,
        sent: &str,
        response: &str,
    ) -> CoreResult<()> {
        if response.trim().is_empty() {
            warn!(record_id = %record_id, action = %action, "Empty response");
            return self.finish(record_id, action, EntryStatus::Error).await;
        }

        match self.policy {
            ConsistencyPolicy::Advisory => {
                self.store
                    .commit_exchange(record_id, action, sent, response, EntryStatus::Done, self.job)
                    .await?;
                info!(record_id = %record_id, action = %action, "Record sent");

                let consistent = ConsistencyChecker::new(&*self.store)
                    .check(record_id, self.job)
                    .await?;
                info!(record_id = %record_id, action = %action, consistent, "Consistency check");
            },
            ConsistencyPolicy::Strict => {
                let status = if payloads_match(sent, response) {
                    EntryStatus::Done
                } else {
                    warn!(record_id = %record_id, action = %action, "Response differs from sent record, marked as error");
                    EntryStatus::Error
                };
                self.store
                    .commit_exchange(record_id, action, sent, response, status, self.job)
                    .await?;
                info!(record_id = %record_id, action = %action, status = %status, "Record sent");
            },
        }
        Ok(())
    }

    async fn finish(&self, record_id: &RecordId, action: Action, status: EntryStatus) -> CoreResult<()> {
        self.store
            .set_status(status, record_id, action, self.job)
            .await?;
        Ok(())
    }

    fn record_path(
        &self,
        resource: &ResourceDescriptor,
        record_id: &RecordId,
        action: Action,
        collection: bool,
    ) -> Option<String> {
        let path = if collection {
            resource.collection_path(record_id)
        } else {
            resource.record_path(record_id)
        };

        path.map_err(|e| {
            warn!(
                record_id = %record_id,
                action = %action,
                api = resource.api,
                kind = resource.kind,
                error = %e,
                "Record id does not fit the resource"
            );
        })
        .ok()
    }
}
