//! Remote record source
//!
//! The replica never talks to the tracking service directly. Everything it
//! fetches comes through [`RecordSource`]; transport, credentials and
//! timeouts belong to the implementation behind the trait.

pub mod fixture;

pub use fixture::{FixtureDocument, FixtureSource};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_common::{Comment, Record, RecordId, Severity};

/// Field name whose history delta corrects the target milestone
pub const TARGET_MILESTONE_FIELD: &str = "target_milestone";

/// Statuses fetched by the first sync of an empty replica
pub const INITIAL_STATUSES: [&str; 3] = ["NEW", "ASSIGNED", "NEEDINFO"];

/// Statuses fetched by every later sync
pub const INCREMENTAL_STATUSES: [&str; 6] =
    ["NEW", "ASSIGNED", "NEEDINFO", "RESOLVED", "CLOSED", "VERIFIED"];

/// One record as returned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub target_milestone: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub operating_system: String,
    pub created_at: DateTime<Utc>,
    /// Last remote modification; drives `changed_since` filtering
    #[serde(default)]
    pub last_change_time: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    /// Overwrite the descriptive fields of a stored record
    ///
    /// Local state (position, tags, comments) is left alone; the `is_new`
    /// flag is re-asserted.
    pub fn apply_to(&self, record: &mut Record) {
        record.summary = self.summary.clone();
        record.assignee = self.assignee.clone();
        record.status = self.status.clone();
        record.severity = self.severity.clone();
        record.target_milestone = self.target_milestone.clone();
        record.component = self.component.clone();
        record.operating_system = self.operating_system.clone();
        record.created_at = self.created_at;
        record.is_new = true;
    }
}

/// Product-wide query for one sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub product: String,
    pub statuses: Vec<String>,
    pub severities: Vec<Severity>,
    /// Only records changed after this instant; `None` fetches everything
    pub changed_since: Option<DateTime<Utc>>,
}

impl ProductQuery {
    /// Query used by a full sync
    ///
    /// The initial sync of an empty replica skips resolved/closed records.
    pub fn for_sync(product: &str, initial: bool, changed_since: Option<DateTime<Utc>>) -> Self {
        let statuses: &[&str] = if initial {
            &INITIAL_STATUSES
        } else {
            &INCREMENTAL_STATUSES
        };
        Self {
            product: product.to_string(),
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            severities: Severity::ALL.to_vec(),
            changed_since,
        }
    }

    /// Every status x severity pair, one fetch group each
    pub fn groups(&self) -> Vec<(String, Severity)> {
        self.statuses
            .iter()
            .flat_map(|status| {
                self.severities
                    .iter()
                    .map(move |severity| (status.clone(), *severity))
            })
            .collect()
    }
}

/// Single field change inside a history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    #[serde(default)]
    pub removed: String,
    #[serde(default)]
    pub added: String,
}

/// Change history of one record, oldest change first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeHistory {
    pub id: RecordId,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
}

impl ChangeHistory {
    /// Latest target milestone recorded in this history, if any
    pub fn corrected_milestone(&self) -> Option<&str> {
        self.changes
            .iter()
            .rev()
            .find(|change| change.field_name == TARGET_MILESTONE_FIELD)
            .map(|change| change.added.as_str())
    }
}

/// Supplier of remote records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Fetch specific records by id; unknown ids are skipped
    async fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<RemoteRecord>>;

    /// Fetch one status x severity group of a product query
    async fn fetch_product(
        &self,
        query: &ProductQuery,
        status: &str,
        severity: Severity,
    ) -> Result<Vec<RemoteRecord>>;

    /// Comments for each id; ids without an entry had no comment data
    async fn fetch_comments(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, Vec<Comment>>>;

    /// Change histories for the given ids
    async fn fetch_history(&self, ids: &[RecordId]) -> Result<Vec<ChangeHistory>>;
}
