//! Tier boundary bookkeeping
//!
//! Each tier level is the position of the last record in that tier, or
//! `None` when the tier is empty (persisted and reported as -1). Positions
//! shift on every structural edit, so reorder code re-anchors levels on
//! record ids and converts back to positions after `reindex()`.

use super::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use triage_common::{RecordId, Tier};

/// Persisted/reported value for an empty tier
pub const EMPTY_LEVEL: i64 = -1;

/// Per-tier anchor records, indexed by `Tier::index()`
pub type TierAnchors = [Option<RecordId>; 3];

/// High/Medium/Low boundary positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierLevels {
    levels: [Option<usize>; 3],
}

impl TierLevels {
    pub fn new(high: Option<usize>, medium: Option<usize>, low: Option<usize>) -> Self {
        Self {
            levels: [high, medium, low],
        }
    }

    /// Levels applied after an initial sync
    pub fn from_defaults(defaults: [usize; 3]) -> Self {
        Self::new(Some(defaults[0]), Some(defaults[1]), Some(defaults[2]))
    }

    /// Build from signed values where any negative value means "empty"
    pub fn from_signed(values: [i64; 3]) -> Self {
        let convert = |v: i64| usize::try_from(v).ok();
        Self::new(convert(values[0]), convert(values[1]), convert(values[2]))
    }

    /// Signed form with -1 for empty tiers
    pub fn to_signed(&self) -> [i64; 3] {
        self.levels
            .map(|level| level.map_or(EMPTY_LEVEL, |l| l as i64))
    }

    pub fn level(&self, tier: Tier) -> Option<usize> {
        self.levels[tier.index()]
    }

    pub fn set_level(&mut self, tier: Tier, level: Option<usize>) {
        self.levels[tier.index()] = level;
    }

    /// Keep every non-empty boundary on the same record after one insertion
    /// at the head of the sequence
    pub fn shift_down(&mut self) {
        for level in self.levels.iter_mut().flatten() {
            *level += 1;
        }
    }

    /// Enforce High <= Medium <= Low
    ///
    /// An empty tier below a non-empty one takes the level above, which keeps
    /// it empty.
    pub fn clamp(&mut self) {
        for index in 1..self.levels.len() {
            if self.levels[index] < self.levels[index - 1] {
                self.levels[index] = self.levels[index - 1];
            }
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.levels.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Tier a sequence position falls into; `None` below the Low boundary
    pub fn tier_of(&self, position: usize) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| self.level(*tier).map_or(false, |level| position <= level))
    }

    /// Resolve a not-included anchor record for every tier
    pub fn resolve_anchors(&self, store: &RecordStore, excluded: &HashSet<RecordId>) -> TierAnchors {
        Tier::ALL.map(|tier| find_previous_not_included(store, self.level(tier), excluded))
    }

    /// Re-derive levels from anchor records after `reindex()`, then clamp
    pub fn from_anchors(store: &RecordStore, anchors: &TierAnchors) -> Self {
        let mut levels = Self {
            levels: anchors.map(|anchor| anchor.and_then(|id| store.position(id))),
        };
        levels.clamp();
        levels
    }
}

/// Walk backward from `position`, skipping `excluded`, and return the first
/// record found
///
/// Positions past the end of the sequence start from the last record.
pub fn find_previous_not_included(
    store: &RecordStore,
    position: Option<usize>,
    excluded: &HashSet<RecordId>,
) -> Option<RecordId> {
    let position = position?;
    let last = store.len().checked_sub(1)?;
    store.ids()[..=position.min(last)]
        .iter()
        .rev()
        .find(|id| !excluded.contains(id))
        .copied()
}
