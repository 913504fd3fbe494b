//! Ordered-priority replica
//!
//! Owns the record store, the ordered sequence and the tier levels as one
//! unit. Callers guard a `Replica` with a single lock (see `state`); nothing
//! in here is thread-safe on its own.
//!
//! # Submodules
//! - `store`: identity mapping + ordered sequence
//! - `tiers`: High/Medium/Low levels and anchor resolution
//! - `merge`: folding remote batches into the replica
//! - `reorder`: manual moves and tier assignment

pub mod merge;
pub mod reorder;
pub mod store;
pub mod tiers;

pub use merge::{MergeBatch, MergeReport};
pub use reorder::ReorderOutcome;
pub use store::RecordStore;
pub use tiers::{TierAnchors, TierLevels, EMPTY_LEVEL};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use triage_common::{Record, RecordId, TagPalette, Tier};

/// Levels applied after the first sync when nothing else is configured
pub const DEFAULT_INITIAL_LEVELS: [usize; 3] = [20, 40, 60];

#[derive(Debug, Clone)]
pub struct Replica {
    store: RecordStore,
    levels: TierLevels,
    initial_levels: [usize; 3],
    palette: TagPalette,
    last_update: Option<DateTime<Utc>>,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_LEVELS)
    }
}

impl Replica {
    /// Empty replica; `initial_levels` are applied by the first merge
    pub fn new(initial_levels: [usize; 3]) -> Self {
        Self {
            store: RecordStore::new(),
            levels: TierLevels::default(),
            initial_levels,
            palette: TagPalette::default(),
            last_update: None,
        }
    }

    /// Rebuild a replica from persisted parts
    ///
    /// Records are placed in the given order and reindexed; the levels are
    /// clamped so a hand-edited database cannot invert tiers.
    pub fn from_parts(
        records: Vec<Record>,
        levels: TierLevels,
        palette: TagPalette,
        last_update: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let mut store = RecordStore::new();
        for record in records {
            store.insert(store.len(), record)?;
        }
        store.reindex();

        let mut levels = levels;
        levels.clamp();

        Ok(Self {
            store,
            levels,
            initial_levels: DEFAULT_INITIAL_LEVELS,
            palette,
            last_update,
        })
    }

    pub fn with_initial_levels(mut self, initial_levels: [usize; 3]) -> Self {
        self.initial_levels = initial_levels;
        self
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn levels(&self) -> TierLevels {
        self.levels
    }

    pub fn level(&self, tier: Tier) -> Option<usize> {
        self.levels.level(tier)
    }

    pub fn initial_levels(&self) -> [usize; 3] {
        self.initial_levels
    }

    pub fn palette(&self) -> &TagPalette {
        &self.palette
    }

    pub fn palette_mut(&mut self) -> &mut TagPalette {
        &mut self.palette
    }

    /// Time of the last successful sync
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn set_last_update(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    pub fn get(&self, id: RecordId) -> Result<&Record> {
        self.store.require(id)
    }

    /// Tier the record currently falls into
    pub fn tier_of(&self, id: RecordId) -> Result<Option<Tier>> {
        let record = self.get(id)?;
        Ok(self.levels.tier_of(record.local_priority))
    }

    /// Read-only copy of all records in priority order
    pub fn snapshot(&self) -> Vec<Record> {
        self.store.iter().cloned().collect()
    }

    /// Add a tag to a record; returns false if it already had it
    pub fn add_tag(&mut self, id: RecordId, tag: &str) -> Result<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Error::Common(triage_common::Error::InvalidInput(
                "Tag name must not be empty".to_string(),
            )));
        }
        let record = self.record_mut(id)?;
        Ok(record.add_tag(tag))
    }

    /// Remove a tag from a record; returns false if it was absent
    pub fn remove_tag(&mut self, id: RecordId, tag: &str) -> Result<bool> {
        let record = self.record_mut(id)?;
        Ok(record.remove_tag(tag))
    }

    pub fn clear_tags(&mut self, id: RecordId) -> Result<()> {
        self.record_mut(id)?.clear_tags();
        Ok(())
    }

    /// Tags of a record, in insertion order
    pub fn tags(&self, id: RecordId) -> Result<Vec<String>> {
        Ok(self.get(id)?.tags().to_vec())
    }

    /// Set or clear the new/changed marker without moving anything
    ///
    /// Returns the records whose flag actually changed, in sequence order.
    /// Unknown ids fail with `NotFound` before any flag is touched. Since
    /// merge inserts after the leading run of new records, clearing markers
    /// at the head moves where the next new records land.
    pub fn set_new(&mut self, ids: &[RecordId], is_new: bool) -> Result<Vec<RecordId>> {
        let selection = self.resolve_selection(ids)?;
        let mut changed = Vec::new();
        for id in selection {
            let record = self.record_mut(id)?;
            if record.is_new != is_new {
                record.is_new = is_new;
                changed.push(id);
            }
        }
        Ok(changed)
    }

    /// Check the positional and tier invariants
    ///
    /// Used by tests and after loading from disk.
    pub fn verify_invariants(&self) -> Result<()> {
        for (index, record) in self.store.iter().enumerate() {
            if record.local_priority != index {
                return Err(Error::Internal(format!(
                    "Record {} has local priority {} at position {}",
                    record.id, record.local_priority, index
                )));
            }
        }
        if self.store.iter().count() != self.store.len() {
            return Err(Error::Internal("Sequence and store disagree".to_string()));
        }
        if !self.levels.is_ordered() {
            return Err(Error::Internal(format!(
                "Tier levels inverted: {:?}",
                self.levels.to_signed()
            )));
        }
        Ok(())
    }

    fn record_mut(&mut self, id: RecordId) -> Result<&mut Record> {
        self.store
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
