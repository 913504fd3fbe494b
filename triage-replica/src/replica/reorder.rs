//! Reorder engine
//!
//! Manual moves of a selection of records, either next to a drop target or
//! into one of the three tiers. Before the selection leaves the sequence,
//! every tier boundary is re-anchored on the nearest record that stays put;
//! after reinsertion the levels are re-derived from those anchors.
//!
//! Selections are validated up front (unknown id → `NotFound`, nothing
//! mutated), de-duplicated, and always processed in sequence order. Moving
//! a record clears its `is_new` flag.

use super::tiers::{TierAnchors, TierLevels};
use super::Replica;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;
use triage_common::{RecordId, Tier};

/// Result of a reorder request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReorderOutcome {
    /// Records moved, in their new sequence order
    Moved { ids: Vec<RecordId> },

    /// Nothing to do (empty selection, or drop onto the selection itself)
    Unchanged,
}

impl ReorderOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, ReorderOutcome::Moved { .. })
    }
}

impl Replica {
    /// Move `ids` as one block immediately before the record at
    /// `target_position`
    ///
    /// `target_position == len` appends the block at the end.
    pub fn set_order_near(&mut self, target_position: usize, ids: &[RecordId]) -> Result<ReorderOutcome> {
        let selection = self.resolve_selection(ids)?;
        if selection.is_empty() {
            return Ok(ReorderOutcome::Unchanged);
        }

        let len = self.store.len();
        if target_position > len {
            return Err(Error::InvalidPosition {
                position: target_position,
                len,
            });
        }

        let excluded: HashSet<RecordId> = selection.iter().copied().collect();
        let target = match self.drop_target(target_position, &excluded) {
            Ok(target) => target,
            Err(Error::ConflictingSelection(id)) => {
                debug!("Drop target {} is part of the selection, ignoring move", id);
                return Ok(ReorderOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };

        let anchors = self.levels.resolve_anchors(&self.store, &excluded);
        self.detach_selection(&selection)?;

        let insert_at = match target {
            Some(id) => self
                .store
                .position(id)
                .ok_or_else(|| Error::Internal(format!("Drop target {} lost during move", id)))?,
            None => self.store.len(),
        };
        for (offset, id) in selection.iter().enumerate() {
            self.store.attach(insert_at + offset, *id)?;
        }

        self.finish_reorder(&anchors);
        debug!(
            "Moved {} records near position {} (levels {:?})",
            selection.len(),
            target_position,
            self.levels.to_signed()
        );
        Ok(ReorderOutcome::Moved { ids: selection })
    }

    /// Move `ids` to the top or bottom of `tier`
    ///
    /// At the top, each record in turn is placed directly below the nearest
    /// non-empty tier above, so a multi-record selection ends up reversed.
    /// At the bottom, records stack in order below the tier's anchor and the
    /// last one becomes the new anchor. An empty target tier receives the
    /// records at its top position and anchors on the lowest of them.
    pub fn set_tier(&mut self, tier: Tier, at_top: bool, ids: &[RecordId]) -> Result<ReorderOutcome> {
        let selection = self.resolve_selection(ids)?;
        if selection.is_empty() {
            return Ok(ReorderOutcome::Unchanged);
        }

        let excluded: HashSet<RecordId> = selection.iter().copied().collect();
        let mut anchors = self.levels.resolve_anchors(&self.store, &excluded);
        self.detach_selection(&selection)?;

        let target_index = tier.index();
        for id in &selection {
            match (at_top, occupied_anchor(tier, &anchors)) {
                (false, Some(anchor)) => {
                    let position = self
                        .store
                        .position(anchor)
                        .ok_or_else(|| Error::Internal(format!("Anchor {} lost during move", anchor)))?;
                    self.store.attach(position + 1, *id)?;
                    anchors[target_index] = Some(*id);
                }
                (true, Some(_)) => {
                    let position = self.top_of_tier(tier, &anchors)?;
                    self.store.attach(position, *id)?;
                }
                (_, None) => {
                    let position = self.top_of_tier(tier, &anchors)?;
                    self.store.attach(position, *id)?;
                    anchors[target_index] = Some(*id);
                }
            }
        }

        self.finish_reorder(&anchors);
        debug!(
            "Moved {} records to the {} of {} tier (levels {:?})",
            selection.len(),
            if at_top { "top" } else { "bottom" },
            tier,
            self.levels.to_signed()
        );

        let moved = self
            .store
            .ids()
            .iter()
            .copied()
            .filter(|id| excluded.contains(id))
            .collect();
        Ok(ReorderOutcome::Moved { ids: moved })
    }

    /// Validate, de-duplicate and sequence-order a selection
    pub(super) fn resolve_selection(&self, ids: &[RecordId]) -> Result<Vec<RecordId>> {
        if let Some(missing) = ids.iter().find(|id| !self.store.contains(**id)) {
            return Err(Error::NotFound(missing.to_string()));
        }
        let wanted: HashSet<RecordId> = ids.iter().copied().collect();
        Ok(self
            .store
            .ids()
            .iter()
            .copied()
            .filter(|id| wanted.contains(id))
            .collect())
    }

    /// Record the block is inserted before; `None` appends
    fn drop_target(&self, position: usize, excluded: &HashSet<RecordId>) -> Result<Option<RecordId>> {
        match self.store.id_at(position) {
            Some(id) if excluded.contains(&id) => Err(Error::ConflictingSelection(id.to_string())),
            target => Ok(target),
        }
    }

    fn detach_selection(&mut self, selection: &[RecordId]) -> Result<()> {
        for id in selection {
            self.store.detach(*id)?;
            if let Some(record) = self.store.get_mut(*id) {
                record.is_new = false;
            }
        }
        Ok(())
    }

    /// Insert position for the top of `tier`: right below the nearest
    /// anchored tier above, else the head of the sequence
    fn top_of_tier(&self, tier: Tier, anchors: &TierAnchors) -> Result<usize> {
        for above in tier.above() {
            if let Some(anchor) = anchors[above.index()] {
                let position = self
                    .store
                    .position(anchor)
                    .ok_or_else(|| Error::Internal(format!("Anchor {} lost during move", anchor)))?;
                return Ok(position + 1);
            }
        }
        Ok(0)
    }

    fn finish_reorder(&mut self, anchors: &TierAnchors) {
        self.store.reindex();
        self.levels = TierLevels::from_anchors(&self.store, anchors);
    }
}

/// Anchor of `tier` if the tier holds any record
///
/// A clamped level shares its anchor with the nearest anchored tier above;
/// such a tier is empty.
fn occupied_anchor(tier: Tier, anchors: &TierAnchors) -> Option<RecordId> {
    let anchor = anchors[tier.index()]?;
    let above = tier.above().find_map(|t| anchors[t.index()]);
    (above != Some(anchor)).then_some(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_common::{Record, TagPalette};

    fn ids(values: &[i64]) -> Vec<RecordId> {
        values.iter().copied().map(RecordId).collect()
    }

    fn order(replica: &Replica) -> Vec<i64> {
        replica.store().ids().iter().map(|id| id.0).collect()
    }

    /// Records 1..=count in order with the given levels
    fn replica_with(count: i64, levels: TierLevels) -> Replica {
        let records = (1..=count).map(|id| Record::new(RecordId(id))).collect();
        Replica::from_parts(records, levels, TagPalette::default(), None).unwrap()
    }

    #[test]
    fn test_order_near_moves_block_before_target() {
        let mut replica = replica_with(6, TierLevels::new(Some(1), Some(3), Some(5)));

        let outcome = replica.set_order_near(1, &ids(&[5, 3])).unwrap();
        assert_eq!(outcome, ReorderOutcome::Moved { ids: ids(&[3, 5]) });
        assert_eq!(order(&replica), vec![1, 3, 5, 2, 4, 6]);
        // High anchor r2, Medium anchor r4, Low anchor r6 keep their records
        assert_eq!(replica.levels(), TierLevels::new(Some(3), Some(4), Some(5)));
        replica.verify_invariants().unwrap();
    }

    #[test]
    fn test_order_near_append_and_bounds() {
        let mut replica = replica_with(3, TierLevels::new(Some(0), Some(1), Some(2)));

        replica.set_order_near(3, &ids(&[1])).unwrap();
        assert_eq!(order(&replica), vec![2, 3, 1]);

        let err = replica.set_order_near(4, &ids(&[1])).unwrap_err();
        assert!(matches!(err, Error::InvalidPosition { position: 4, len: 3 }));
    }

    #[test]
    fn test_order_near_onto_selection_is_noop() {
        let mut replica = replica_with(4, TierLevels::new(Some(0), Some(1), Some(2)));
        replica.store.get_mut(RecordId(2)).unwrap().is_new = true;

        let outcome = replica.set_order_near(1, &ids(&[2, 3])).unwrap();
        assert_eq!(outcome, ReorderOutcome::Unchanged);
        assert_eq!(order(&replica), vec![1, 2, 3, 4]);
        assert!(replica.get(RecordId(2)).unwrap().is_new);
    }

    #[test]
    fn test_unknown_id_mutates_nothing() {
        let mut replica = replica_with(3, TierLevels::new(Some(0), Some(1), Some(2)));
        let err = replica.set_order_near(0, &ids(&[3, 42])).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(order(&replica), vec![1, 2, 3]);

        let err = replica.set_tier(Tier::High, true, &ids(&[42])).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let mut replica = replica_with(2, TierLevels::new(Some(0), Some(1), Some(1)));
        assert_eq!(replica.set_order_near(0, &[]).unwrap(), ReorderOutcome::Unchanged);
        assert_eq!(replica.set_tier(Tier::Low, false, &[]).unwrap(), ReorderOutcome::Unchanged);
    }

    #[test]
    fn test_moved_records_are_acknowledged() {
        let mut replica = replica_with(3, TierLevels::new(Some(0), Some(1), Some(2)));
        for id in 1..=3 {
            replica.store.get_mut(RecordId(id)).unwrap().is_new = true;
        }

        replica.set_order_near(0, &ids(&[3])).unwrap();
        assert!(!replica.get(RecordId(3)).unwrap().is_new);
        assert!(replica.get(RecordId(1)).unwrap().is_new);
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let mut replica = replica_with(4, TierLevels::new(Some(0), Some(1), Some(3)));
        replica.set_order_near(0, &ids(&[4, 4, 3])).unwrap();
        assert_eq!(order(&replica), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_set_tier_at_top_scenario() {
        // [r1 new Critical, r2 new Minor, r3 old], High=1 Medium=2 Low=2
        let mut replica = replica_with(3, TierLevels::new(Some(1), Some(2), Some(2)));
        replica.store.get_mut(RecordId(1)).unwrap().is_new = true;
        replica.store.get_mut(RecordId(2)).unwrap().is_new = true;

        replica.set_tier(Tier::High, true, &ids(&[3])).unwrap();

        assert_eq!(order(&replica), vec![3, 1, 2]);
        assert_eq!(replica.get(RecordId(3)).unwrap().local_priority, 0);
        assert_eq!(replica.tier_of(RecordId(3)).unwrap(), Some(Tier::High));
        // r2 is still the last High record
        assert_eq!(replica.levels(), TierLevels::new(Some(2), Some(2), Some(2)));
        assert!(!replica.get(RecordId(3)).unwrap().is_new);
        replica.verify_invariants().unwrap();
    }

    #[test]
    fn test_set_tier_at_top_below_higher_tier() {
        let mut replica = replica_with(6, TierLevels::new(Some(1), Some(3), Some(5)));

        replica.set_tier(Tier::Low, true, &ids(&[1, 6])).unwrap();

        // Each record goes to the very top of Low, so the block is reversed
        assert_eq!(order(&replica), vec![2, 3, 4, 6, 1, 5]);
        assert_eq!(replica.tier_of(RecordId(1)).unwrap(), Some(Tier::Low));
        assert_eq!(replica.tier_of(RecordId(6)).unwrap(), Some(Tier::Low));
        assert_eq!(replica.levels(), TierLevels::new(Some(0), Some(2), Some(5)));
        replica.verify_invariants().unwrap();
    }

    #[test]
    fn test_set_tier_bottom_stacks_in_order() {
        let mut replica = replica_with(6, TierLevels::new(Some(1), Some(3), Some(5)));

        replica.set_tier(Tier::High, false, &ids(&[6, 4])).unwrap();

        assert_eq!(order(&replica), vec![1, 2, 4, 6, 3, 5]);
        assert_eq!(replica.level(Tier::High), Some(3));
        assert_eq!(replica.tier_of(RecordId(6)).unwrap(), Some(Tier::High));
        assert_eq!(replica.tier_of(RecordId(3)).unwrap(), Some(Tier::Medium));
        replica.verify_invariants().unwrap();
    }

    #[test]
    fn test_set_tier_medium_straddling_selection() {
        let mut replica = replica_with(6, TierLevels::new(Some(1), Some(3), Some(5)));

        replica.set_tier(Tier::Medium, false, &ids(&[2, 3])).unwrap();

        assert_eq!(order(&replica), vec![1, 4, 2, 3, 5, 6]);
        assert_eq!(replica.levels(), TierLevels::new(Some(0), Some(3), Some(5)));
        assert!(replica.level(Tier::Medium) >= replica.level(Tier::High));
    }

    #[test]
    fn test_set_tier_into_empty_tier() {
        let mut replica = replica_with(4, TierLevels::new(Some(0), None, Some(3)));
        replica.levels.clamp();
        assert_eq!(replica.levels(), TierLevels::new(Some(0), Some(0), Some(3)));

        // A clamped Medium level anchors on the High boundary record
        replica.set_tier(Tier::Medium, false, &ids(&[4])).unwrap();
        assert_eq!(order(&replica), vec![1, 4, 2, 3]);
        assert_eq!(replica.levels(), TierLevels::new(Some(0), Some(1), Some(3)));
        assert_eq!(replica.tier_of(RecordId(4)).unwrap(), Some(Tier::Medium));

        // Truly empty tiers anchor on the moved records
        let mut replica = replica_with(4, TierLevels::new(None, None, Some(3)));
        replica.set_tier(Tier::Medium, true, &ids(&[3, 4])).unwrap();
        assert_eq!(order(&replica), vec![4, 3, 1, 2]);
        assert_eq!(replica.levels(), TierLevels::new(None, Some(1), Some(3)));
        assert_eq!(replica.tier_of(RecordId(4)).unwrap(), Some(Tier::Medium));

        let mut replica = replica_with(4, TierLevels::new(Some(0), None, None));
        replica.set_tier(Tier::Low, false, &ids(&[3, 4])).unwrap();
        assert_eq!(order(&replica), vec![1, 3, 4, 2]);
        assert_eq!(replica.levels(), TierLevels::new(Some(0), Some(0), Some(2)));
    }

    #[test]
    fn test_set_tier_at_top_of_clamped_tier() {
        // Medium shares the High boundary record, so it is empty
        let mut replica = replica_with(4, TierLevels::new(Some(1), Some(1), Some(3)));

        replica.set_tier(Tier::Medium, true, &ids(&[4])).unwrap();
        assert_eq!(order(&replica), vec![1, 2, 4, 3]);
        assert_eq!(replica.levels(), TierLevels::new(Some(1), Some(2), Some(3)));
        assert_eq!(replica.tier_of(RecordId(4)).unwrap(), Some(Tier::Medium));
    }

    #[test]
    fn test_set_tier_whole_sequence() {
        let mut replica = replica_with(3, TierLevels::new(Some(0), Some(1), Some(2)));
        replica.set_tier(Tier::Low, false, &ids(&[1, 2, 3])).unwrap();

        assert_eq!(order(&replica), vec![1, 2, 3]);
        assert_eq!(replica.levels(), TierLevels::new(None, None, Some(2)));
        replica.verify_invariants().unwrap();
    }
}
