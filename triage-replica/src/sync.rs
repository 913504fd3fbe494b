//! Sync orchestrator
//!
//! Pulls records from the [`RecordSource`] and folds them into the shared
//! replica. Fetching runs outside the replica lock as a bounded set of
//! concurrent status x severity groups; only the final merge takes the write
//! lock. A sync either commits completely or leaves the replica untouched.

use crate::error::{Error, Result};
use crate::replica::{MergeBatch, MergeReport};
use crate::source::{ProductQuery, RecordSource, RemoteRecord};
use crate::state::SharedState;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triage_common::events::TriageEvent;
use triage_common::RecordId;
use uuid::Uuid;

/// Result of a committed sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub sync_id: Uuid,
    #[serde(flatten)]
    pub report: MergeReport,
    /// Records received from the source
    pub records_fetched: usize,
    pub message: String,
}

pub struct SyncService {
    state: Arc<SharedState>,
    source: Arc<dyn RecordSource>,
    product: String,
    max_concurrent_fetches: usize,
}

impl SyncService {
    pub fn new(
        state: Arc<SharedState>,
        source: Arc<dyn RecordSource>,
        product: impl Into<String>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            state,
            source,
            product: product.into(),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// Fetch every record of the product changed since the last sync and
    /// merge them
    pub async fn full_sync(&self, cancel: &CancellationToken) -> Result<SyncSummary> {
        let started_at = Utc::now();
        let sync_id = Uuid::new_v4();
        let (initial, changed_since) = {
            let replica = self.state.replica.read().await;
            (replica.is_empty(), replica.last_update())
        };

        info!(
            "Sync {} started for product '{}' via {} (initial: {}, changed since: {:?})",
            sync_id,
            self.product,
            self.source.name(),
            initial,
            changed_since
        );
        self.state.broadcast_event(TriageEvent::SyncStarted {
            sync_id,
            initial,
            timestamp: started_at,
        });

        let query = ProductQuery::for_sync(&self.product, initial, changed_since);
        let result = self.run_full_sync(&query, initial, started_at, cancel).await;
        self.finish(sync_id, result)
    }

    /// Re-fetch specific records and merge them
    ///
    /// Does not advance the last sync time.
    pub async fn refresh(&self, ids: &[RecordId], cancel: &CancellationToken) -> Result<SyncSummary> {
        let sync_id = Uuid::new_v4();
        let initial = self.state.replica.read().await.is_empty();

        info!("Refresh {} started for {} records", sync_id, ids.len());
        self.state.broadcast_event(TriageEvent::SyncStarted {
            sync_id,
            initial,
            timestamp: Utc::now(),
        });

        let result = self.run_refresh(ids, initial, cancel).await;
        self.finish(sync_id, result)
    }

    async fn run_full_sync(
        &self,
        query: &ProductQuery,
        initial: bool,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(MergeReport, usize)> {
        let records = self.fetch_groups(query, cancel).await?;
        let batch = self.fetch_details(records, initial, cancel).await?;
        self.commit(batch, Some(started_at), cancel).await
    }

    async fn run_refresh(
        &self,
        ids: &[RecordId],
        initial: bool,
        cancel: &CancellationToken,
    ) -> Result<(MergeReport, usize)> {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            fetched = self.source.fetch_by_ids(ids) => fetched,
        };
        let records = fetched.map_err(|e| Error::RemoteFetchFailed {
            message: e.to_string(),
            groups_completed: 0,
            records_fetched: 0,
        })?;
        let batch = self.fetch_details(records, initial, cancel).await?;
        self.commit(batch, None, cancel).await
    }

    /// Run all fetch groups with bounded concurrency
    async fn fetch_groups(&self, query: &ProductQuery, cancel: &CancellationToken) -> Result<Vec<RemoteRecord>> {
        let groups = query.groups();
        let total_groups = groups.len();
        let source = &self.source;

        let results: Vec<(String, Result<Vec<RemoteRecord>>)> = stream::iter(groups)
            .map(|(status, severity)| async move {
                let label = format!("{} / {}", status, severity);
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    fetched = source.fetch_product(query, &status, severity) => fetched,
                };
                (label, result)
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await;

        if cancel.is_cancelled() {
            info!("Sync cancelled during fetch");
            return Err(Error::Cancelled);
        }

        let mut records = Vec::new();
        let mut groups_completed = 0;
        let mut failures = Vec::new();
        for (label, result) in results {
            match result {
                Ok(mut group) => {
                    debug!("Fetched group {}: {} records", label, group.len());
                    groups_completed += 1;
                    records.append(&mut group);
                }
                Err(e) => {
                    warn!("Fetch group {} failed: {}", label, e);
                    failures.push(format!("{}: {}", label, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::RemoteFetchFailed {
                message: format!(
                    "{} of {} fetch groups failed ({})",
                    failures.len(),
                    total_groups,
                    failures.join("; ")
                ),
                groups_completed,
                records_fetched: records.len(),
            });
        }

        // Groups finish in any order
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        Ok(records)
    }

    /// Attach comments and history to a fetched batch
    ///
    /// Skipped for the initial sync. A comment failure only flags records for
    /// refresh; a history failure fails the sync.
    async fn fetch_details(
        &self,
        records: Vec<RemoteRecord>,
        initial: bool,
        cancel: &CancellationToken,
    ) -> Result<MergeBatch> {
        let batch = MergeBatch::new(records);
        if initial || batch.records.is_empty() {
            return Ok(batch);
        }

        let ids = batch.ids();
        let records_fetched = ids.len();

        let comments = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            comments = self.source.fetch_comments(&ids) => comments,
        };
        let batch = match comments {
            Ok(comments) => batch.with_comments(comments),
            Err(e) => {
                warn!("Comment fetch failed, records will need a refresh: {}", e);
                batch
            }
        };

        let history = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            history = self.source.fetch_history(&ids) => history,
        };
        let history = history.map_err(|e| Error::RemoteFetchFailed {
            message: format!("History fetch failed: {}", e),
            groups_completed: 0,
            records_fetched,
        })?;

        Ok(batch.with_history(history))
    }

    /// Merge under the write lock, persist, then publish
    async fn commit(
        &self,
        batch: MergeBatch,
        last_update: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<(MergeReport, usize)> {
        let records_fetched = batch.records.len();
        let report = self
            .state
            .update(|replica| {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                // `update` already hands us a staged copy
                let report = replica.merge_in_place(batch)?;
                if let Some(at) = last_update {
                    replica.set_last_update(at);
                }
                Ok(report)
            })
            .await?;

        Ok((report, records_fetched))
    }

    fn finish(&self, sync_id: Uuid, result: Result<(MergeReport, usize)>) -> Result<SyncSummary> {
        match result {
            Ok((report, records_fetched)) => {
                let message = report.summary();
                info!("Sync {}: {}", sync_id, message);
                self.state.broadcast_event(TriageEvent::SyncCompleted {
                    sync_id,
                    new_count: report.new_count,
                    modified_count: report.modified_count,
                    timestamp: Utc::now(),
                });
                Ok(SyncSummary {
                    sync_id,
                    report,
                    records_fetched,
                    message,
                })
            }
            Err(e) => {
                warn!("Sync {} failed: {}", sync_id, e);
                self.state.broadcast_event(TriageEvent::SyncFailed {
                    sync_id,
                    message: e.to_string(),
                    processed: e.processed(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }
}
