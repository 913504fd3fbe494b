//! Merge engine
//!
//! Folds a batch of remote records into the replica. New records cluster at
//! the head of the sequence right after any records still flagged new;
//! modified records keep their position. The whole batch is staged on a
//! copy of the replica and swapped in only on success.

use super::tiers::TierLevels;
use super::Replica;
use crate::error::{Error, Result};
use crate::source::{ChangeHistory, RemoteRecord};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use triage_common::{Comment, Record, RecordId};

/// One atomic update from the remote source
#[derive(Debug, Clone, Default)]
pub struct MergeBatch {
    pub records: Vec<RemoteRecord>,

    /// `None` when comment data was not fetched for this batch
    pub comments: Option<HashMap<RecordId, Vec<Comment>>>,

    /// Change histories used to correct target milestones
    pub history: Option<Vec<ChangeHistory>>,
}

impl MergeBatch {
    pub fn new(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            comments: None,
            history: None,
        }
    }

    pub fn with_comments(mut self, comments: HashMap<RecordId, Vec<Comment>>) -> Self {
        self.comments = Some(comments);
        self
    }

    pub fn with_history(mut self, history: Vec<ChangeHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }
}

/// Outcome of a successful merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub new_count: usize,
    pub modified_count: usize,
    /// The replica was empty before this merge
    pub initial: bool,
}

impl MergeReport {
    pub fn summary(&self) -> String {
        format!(
            "Bug list updated ({} added, {} modified)",
            self.new_count, self.modified_count
        )
    }
}

impl Replica {
    /// Merge a remote batch
    ///
    /// On error the replica is left exactly as it was.
    pub fn merge(&mut self, batch: MergeBatch) -> Result<MergeReport> {
        let mut staged = self.clone();
        let report = staged.merge_in_place(batch)?;
        *self = staged;
        Ok(report)
    }

    /// Merge a remote batch without staging a copy first
    ///
    /// On error `self` may be half-merged and must be discarded. For callers
    /// that already work on a staged copy, such as
    /// [`SharedState::update`](crate::state::SharedState::update).
    pub fn merge_in_place(&mut self, batch: MergeBatch) -> Result<MergeReport> {
        let initial = self.store.is_empty();
        let MergeBatch {
            mut records,
            comments,
            history,
        } = batch;

        if !initial {
            if let Some(history) = &history {
                apply_milestone_corrections(&mut records, history);
            }
        }

        let mut new_count = 0;
        let mut modified_count = 0;

        for remote in &records {
            if !remote.id.is_valid() {
                return Err(Error::MergeAborted {
                    reason: format!("invalid record id {}", remote.id),
                });
            }

            if self.store.contains(remote.id) {
                modified_count += 1;
            } else {
                let position = self.store.new_prefix_len();
                self.store
                    .insert(position, Record::new(remote.id))
                    .map_err(|e| Error::MergeAborted {
                        reason: e.to_string(),
                    })?;
                self.levels.shift_down();
                new_count += 1;
            }

            let record = self.store.get_mut(remote.id).ok_or_else(|| Error::MergeAborted {
                reason: format!("record {} vanished during merge", remote.id),
            })?;
            remote.apply_to(record);

            match comments.as_ref().and_then(|all| all.get(&remote.id)) {
                Some(list) => {
                    record.comments = list.clone();
                    record.requires_refresh = false;
                }
                None => record.requires_refresh = true,
            }
        }

        self.store
            .sort_head_by_key(new_count, |record| record.auto_priority());
        self.store.reindex();

        if initial {
            self.levels = TierLevels::from_defaults(self.initial_levels);
        }

        debug!(
            "Merged {} records ({} new, {} modified, initial: {})",
            records.len(),
            new_count,
            modified_count,
            initial
        );

        Ok(MergeReport {
            new_count,
            modified_count,
            initial,
        })
    }
}

fn apply_milestone_corrections(records: &mut [RemoteRecord], history: &[ChangeHistory]) {
    let by_id: HashMap<RecordId, usize> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (record.id, index))
        .collect();

    for entry in history {
        let (Some(index), Some(milestone)) = (by_id.get(&entry.id), entry.corrected_milestone())
        else {
            continue;
        };
        records[*index].target_milestone = milestone.to_string();
    }
}
