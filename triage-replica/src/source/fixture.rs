//! JSON fixture record source
//!
//! Serves a fixed document of remote records, comments and histories. The
//! binary uses it in place of a live tracker connection; tests mutate it
//! between syncs and inject per-group failures.

use super::{ChangeHistory, ProductQuery, RecordSource, RemoteRecord};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use triage_common::{Comment, RecordId, Severity};

/// Comments of one record as stored in the fixture document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureComments {
    pub id: RecordId,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// On-disk fixture layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub records: Vec<RemoteRecord>,
    #[serde(default)]
    pub comments: Vec<FixtureComments>,
    #[serde(default)]
    pub history: Vec<ChangeHistory>,
}

#[derive(Debug, Default)]
struct FixtureFaults {
    groups: HashSet<(String, Severity)>,
    comments: bool,
    history: bool,
}

/// In-memory [`RecordSource`] backed by a [`FixtureDocument`]
#[derive(Debug, Default)]
pub struct FixtureSource {
    document: RwLock<FixtureDocument>,
    faults: RwLock<FixtureFaults>,
    product_fetches: AtomicUsize,
}

impl FixtureSource {
    pub fn new(document: FixtureDocument) -> Self {
        Self {
            document: RwLock::new(document),
            ..Self::default()
        }
    }

    /// Load a fixture document from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let document: FixtureDocument = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid fixture {}: {}", path.display(), e)))?;
        info!(
            "Loaded fixture {} ({} records, {} comment sets, {} histories)",
            path.display(),
            document.records.len(),
            document.comments.len(),
            document.history.len()
        );
        Ok(Self::new(document))
    }

    /// Insert or replace a remote record
    pub async fn upsert(&self, record: RemoteRecord) {
        let mut document = self.document.write().await;
        match document.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => document.records.push(record),
        }
    }

    /// Replace the comments served for one record
    pub async fn set_comments(&self, id: RecordId, comments: Vec<Comment>) {
        let mut document = self.document.write().await;
        document.comments.retain(|c| c.id != id);
        document.comments.push(FixtureComments { id, comments });
    }

    pub async fn push_history(&self, history: ChangeHistory) {
        self.document.write().await.history.push(history);
    }

    /// Make one status x severity group fail on fetch
    pub async fn fail_group(&self, status: &str, severity: Severity) {
        self.faults
            .write()
            .await
            .groups
            .insert((status.to_string(), severity));
    }

    pub async fn fail_comments(&self, fail: bool) {
        self.faults.write().await.comments = fail;
    }

    pub async fn fail_history(&self, fail: bool) {
        self.faults.write().await.history = fail;
    }

    /// Number of product group fetches served so far
    pub fn product_fetches(&self) -> usize {
        self.product_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<RemoteRecord>> {
        let document = self.document.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| document.records.iter().find(|r| r.id == *id).cloned())
            .collect())
    }

    async fn fetch_product(
        &self,
        query: &ProductQuery,
        status: &str,
        severity: Severity,
    ) -> Result<Vec<RemoteRecord>> {
        self.product_fetches.fetch_add(1, Ordering::Relaxed);

        if self
            .faults
            .read()
            .await
            .groups
            .contains(&(status.to_string(), severity))
        {
            return Err(Error::Internal(format!(
                "Fixture fetch failed for {} / {}",
                status, severity
            )));
        }

        let document = self.document.read().await;
        let records: Vec<RemoteRecord> = document
            .records
            .iter()
            .filter(|r| r.product == query.product)
            .filter(|r| r.status.eq_ignore_ascii_case(status))
            .filter(|r| Severity::parse(&r.severity) == Some(severity))
            .filter(|r| match (query.changed_since, r.last_change_time) {
                (Some(since), Some(changed)) => changed > since,
                (Some(since), None) => r.created_at > since,
                (None, _) => true,
            })
            .cloned()
            .collect();

        debug!("Fixture group {} / {}: {} records", status, severity, records.len());
        Ok(records)
    }

    async fn fetch_comments(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, Vec<Comment>>> {
        if self.faults.read().await.comments {
            return Err(Error::Internal("Fixture comment fetch failed".to_string()));
        }

        // Every known record gets an entry, even with no comments
        let document = self.document.read().await;
        Ok(ids
            .iter()
            .filter(|id| document.records.iter().any(|r| r.id == **id))
            .map(|id| {
                let comments = document
                    .comments
                    .iter()
                    .find(|c| c.id == *id)
                    .map(|c| c.comments.clone())
                    .unwrap_or_default();
                (*id, comments)
            })
            .collect())
    }

    async fn fetch_history(&self, ids: &[RecordId]) -> Result<Vec<ChangeHistory>> {
        if self.faults.read().await.history {
            return Err(Error::Internal("Fixture history fetch failed".to_string()));
        }

        let wanted: HashSet<RecordId> = ids.iter().copied().collect();
        let document = self.document.read().await;
        Ok(document
            .history
            .iter()
            .filter(|h| wanted.contains(&h.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn remote(id: i64, status: &str, severity: &str) -> RemoteRecord {
        RemoteRecord {
            id: RecordId(id),
            product: "Widgets".to_string(),
            summary: format!("record {}", id),
            assignee: String::new(),
            status: status.to_string(),
            severity: severity.to_string(),
            target_milestone: "---".to_string(),
            component: "Core".to_string(),
            operating_system: "All".to_string(),
            created_at: Utc::now() - Duration::days(10),
            last_change_time: None,
        }
    }

    fn document() -> FixtureDocument {
        FixtureDocument {
            records: vec![
                remote(1, "NEW", "Critical"),
                remote(2, "NEW", "Minor"),
                remote(3, "RESOLVED", "Critical"),
            ],
            comments: Vec::new(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_product_filters_group() {
        let source = FixtureSource::new(document());
        let query = ProductQuery::for_sync("Widgets", false, None);

        let group = source
            .fetch_product(&query, "NEW", Severity::Critical)
            .await
            .unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].id, RecordId(1));

        let other_product = ProductQuery::for_sync("Gadgets", false, None);
        let group = source
            .fetch_product(&other_product, "NEW", Severity::Critical)
            .await
            .unwrap();
        assert!(group.is_empty());
        assert_eq!(source.product_fetches(), 2);
    }

    #[tokio::test]
    async fn test_changed_since_filter() {
        let source = FixtureSource::new(document());
        let mut touched = remote(2, "NEW", "Minor");
        touched.last_change_time = Some(Utc::now());
        source.upsert(touched).await;

        let query = ProductQuery::for_sync("Widgets", false, Some(Utc::now() - Duration::days(1)));
        let minor = source.fetch_product(&query, "NEW", Severity::Minor).await.unwrap();
        let critical = source.fetch_product(&query, "NEW", Severity::Critical).await.unwrap();
        assert_eq!(minor.len(), 1);
        assert!(critical.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = FixtureSource::new(document());
        let query = ProductQuery::for_sync("Widgets", true, None);

        source.fail_group("NEW", Severity::Minor).await;
        assert!(source.fetch_product(&query, "NEW", Severity::Minor).await.is_err());
        assert!(source.fetch_product(&query, "NEW", Severity::Major).await.is_ok());

        source.fail_comments(true).await;
        assert!(source.fetch_comments(&[RecordId(1)]).await.is_err());
        source.fail_history(true).await;
        assert!(source.fetch_history(&[RecordId(1)]).await.is_err());
    }

    #[tokio::test]
    async fn test_comments_cover_every_known_record() {
        let source = FixtureSource::new(document());
        source
            .set_comments(
                RecordId(1),
                vec![Comment {
                    author: "dev@example.org".to_string(),
                    text: "confirmed".to_string(),
                    time: Utc::now(),
                    is_private: false,
                    attachment: None,
                }],
            )
            .await;

        let comments = source
            .fetch_comments(&[RecordId(1), RecordId(2), RecordId(42)])
            .await
            .unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[&RecordId(1)].len(), 1);
        assert!(comments[&RecordId(2)].is_empty());
    }

    #[tokio::test]
    async fn test_demo_fixture_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/fixture.json");
        let source = FixtureSource::from_file(&path).unwrap();

        let query = ProductQuery::for_sync("Widgets", true, None);
        let critical = source
            .fetch_product(&query, "NEW", Severity::Critical)
            .await
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].id, RecordId(1201));

        let comments = source.fetch_comments(&[RecordId(1201)]).await.unwrap();
        assert!(comments[&RecordId(1201)][0].attachment.is_some());
    }

    #[tokio::test]
    async fn test_fetch_by_ids_skips_unknown() {
        let source = FixtureSource::new(document());
        let records = source
            .fetch_by_ids(&[RecordId(3), RecordId(99), RecordId(1)])
            .await
            .unwrap();
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId(3), RecordId(1)]);
    }
}
