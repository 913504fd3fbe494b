//! Shared fixtures for triage-replica integration tests

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use triage_common::RecordId;
use triage_replica::replica::Replica;
use triage_replica::source::{FixtureDocument, FixtureSource, RemoteRecord};
use triage_replica::{SharedState, SyncService};

pub const PRODUCT: &str = "Widgets";

/// Levels used instead of 20/40/60 so small fixtures span every tier
pub const TEST_LEVELS: [usize; 3] = [1, 2, 3];

pub fn remote(id: i64, status: &str, severity: &str) -> RemoteRecord {
    RemoteRecord {
        id: RecordId(id),
        product: PRODUCT.to_string(),
        summary: format!("record {}", id),
        assignee: "triage@example.org".to_string(),
        status: status.to_string(),
        severity: severity.to_string(),
        target_milestone: "---".to_string(),
        component: "Core".to_string(),
        operating_system: "All".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        last_change_time: None,
    }
}

/// Remote record changed after any sync run by the test
pub fn touched(id: i64, status: &str, severity: &str, minutes: i64) -> RemoteRecord {
    let mut record = remote(id, status, severity);
    record.last_change_time = Some(Utc::now() + Duration::minutes(minutes));
    record
}

/// Initial sync of this document yields the order [2, 5, 6, 3, 1]
pub fn document() -> FixtureDocument {
    let mut other_product = remote(7, "NEW", "Critical");
    other_product.product = "Gadgets".to_string();

    FixtureDocument {
        records: vec![
            remote(1, "NEW", "Minor"),
            remote(2, "NEW", "Critical"),
            remote(3, "ASSIGNED", "Normal"),
            remote(4, "RESOLVED", "Critical"),
            remote(5, "NEEDINFO", "Critical"),
            remote(6, "NEW", "Major"),
            other_product,
        ],
        comments: Vec::new(),
        history: Vec::new(),
    }
}

pub fn order(replica: &Replica) -> Vec<i64> {
    replica.store().ids().iter().map(|id| id.0).collect()
}

pub fn ids(values: &[i64]) -> Vec<RecordId> {
    values.iter().copied().map(RecordId).collect()
}

/// In-memory state, fixture source and sync service wired together
pub fn setup() -> (Arc<SharedState>, Arc<FixtureSource>, SyncService) {
    let state = Arc::new(SharedState::new(Replica::new(TEST_LEVELS)));
    let source = Arc::new(FixtureSource::new(document()));
    let sync = SyncService::new(Arc::clone(&state), source.clone(), PRODUCT, 4);
    (state, source, sync)
}
