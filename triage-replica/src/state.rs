//! Shared replica state
//!
//! The record store, ordered sequence and tier levels live behind one
//! coarse `RwLock`: display reads share it, merges and reorders take it
//! exclusively. Remote fetches never hold it.

use crate::db;
use crate::error::Result;
use crate::replica::Replica;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, RwLock};
use triage_common::events::{EventBus, TriageEvent};

/// Event channel capacity for SSE listeners
const EVENT_CAPACITY: usize = 100;

pub struct SharedState {
    /// The single lock guarding the whole replica
    pub replica: RwLock<Replica>,

    /// Event broadcaster for SSE events
    pub events: EventBus,

    /// Persistence target; `None` keeps the replica in memory only
    db: Option<SqlitePool>,
}

impl SharedState {
    pub fn new(replica: Replica) -> Self {
        Self {
            replica: RwLock::new(replica),
            events: EventBus::new(EVENT_CAPACITY),
            db: None,
        }
    }

    /// Attach a database; every committed change is saved to it
    pub fn with_database(mut self, pool: SqlitePool) -> Self {
        self.db = Some(pool);
        self
    }

    pub fn database(&self) -> Option<&SqlitePool> {
        self.db.as_ref()
    }

    /// Save `replica` if a database is attached
    ///
    /// Call while still holding the write guard so saves land in commit order.
    pub async fn persist(&self, replica: &Replica) -> Result<()> {
        match &self.db {
            Some(pool) => db::save_replica(pool, replica).await,
            None => Ok(()),
        }
    }

    /// Apply `change` to a copy of the replica, persist the copy, then swap
    /// it in
    ///
    /// Holds the write lock throughout. If `change` or the save fails, the
    /// shared replica is left as it was.
    pub async fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Replica) -> Result<T>,
    {
        let mut replica = self.replica.write().await;
        let mut staged = replica.clone();
        let value = change(&mut staged)?;
        self.persist(&staged).await?;
        *replica = staged;
        Ok(value)
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: TriageEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<TriageEvent> {
        self.events.subscribe()
    }
}
