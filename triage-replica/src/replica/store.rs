//! Record Store and Ordered Sequence
//!
//! One structure holds both: an arena of records keyed by their stable id,
//! and the ordered list of ids that is the single source of truth for display
//! and priority order.
//!
//! **Invariants** (hold after every `reindex()`):
//! - every arena id appears exactly once in the sequence
//! - `record.local_priority == position of record.id in the sequence`
//!
//! The structure is not thread-safe; callers serialize access through the
//! shared state lock.

use crate::error::{Error, Result};
use std::collections::HashMap;
use triage_common::{Record, RecordId};

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    /// Identity mapping for O(1) lookup
    records: HashMap<RecordId, Record>,

    /// Priority order (head = highest priority)
    order: Vec<RecordId>,
}

impl RecordStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the sequence
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// O(1) lookup by id
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(&id)
    }

    /// Lookup that treats absence as an error
    pub fn require(&self, id: RecordId) -> Result<&Record> {
        self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Ids in sequence order
    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    /// Id at `position`, if any
    pub fn id_at(&self, position: usize) -> Option<RecordId> {
        self.order.get(position).copied()
    }

    /// Current position of `id` in the sequence
    ///
    /// Uses the cached `local_priority` when it is still accurate and falls
    /// back to a scan while the sequence is mid-edit.
    pub fn position(&self, id: RecordId) -> Option<usize> {
        let cached = self.records.get(&id)?.local_priority;
        if self.order.get(cached) == Some(&id) {
            return Some(cached);
        }
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Records in sequence order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(move |id| self.records.get(id))
    }

    /// Insert a new record at `position`
    ///
    /// `position` must be in `[0, len]`. Inserting an id that is already
    /// stored is rejected.
    pub fn insert(&mut self, position: usize, record: Record) -> Result<()> {
        if position > self.order.len() {
            return Err(Error::InvalidPosition {
                position,
                len: self.order.len(),
            });
        }
        if self.records.contains_key(&record.id) {
            return Err(Error::Internal(format!("Record {} already stored", record.id)));
        }
        self.order.insert(position, record.id);
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Remove a record by identity from both the arena and the sequence
    pub fn remove(&mut self, id: RecordId) -> Result<Record> {
        let record = self
            .records
            .remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.order.retain(|candidate| *candidate != id);
        Ok(record)
    }

    /// Take a stored record out of the sequence, keeping it in the arena
    ///
    /// Must be followed by `attach()` before the next `reindex()`.
    pub fn detach(&mut self, id: RecordId) -> Result<()> {
        let position = self
            .order
            .iter()
            .position(|candidate| *candidate == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.order.remove(position);
        Ok(())
    }

    /// Put a detached record back into the sequence at `position`
    pub fn attach(&mut self, position: usize, id: RecordId) -> Result<()> {
        if !self.records.contains_key(&id) {
            return Err(Error::NotFound(id.to_string()));
        }
        if position > self.order.len() {
            return Err(Error::InvalidPosition {
                position,
                len: self.order.len(),
            });
        }
        if self.order.contains(&id) {
            return Err(Error::Internal(format!("Record {} is already in the sequence", id)));
        }
        self.order.insert(position, id);
        Ok(())
    }

    /// Stable-sort the first `count` entries of the sequence by `key`
    ///
    /// Entries past `count` keep their order.
    pub fn sort_head_by_key<K, F>(&mut self, count: usize, mut key: F)
    where
        K: Ord,
        F: FnMut(&Record) -> K,
    {
        let count = count.min(self.order.len());
        let records = &self.records;
        self.order[..count].sort_by_key(|id| records.get(id).map(&mut key));
    }

    /// Write `local_priority = index` into every record. O(n).
    ///
    /// Must run after any structural change and before tier levels are
    /// re-derived.
    pub fn reindex(&mut self) {
        for (index, id) in self.order.iter().enumerate() {
            if let Some(record) = self.records.get_mut(id) {
                record.local_priority = index;
            }
        }
    }

    /// Number of leading records flagged `is_new`
    pub fn new_prefix_len(&self) -> usize {
        self.order
            .iter()
            .take_while(|id| self.records.get(id).map_or(false, |r| r.is_new))
            .count()
    }
}
