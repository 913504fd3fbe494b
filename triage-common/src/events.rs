//! Event types for the triage event system
//!
//! Provides the shared event enum and the EventBus used to fan events out to
//! SSE clients and other in-process listeners.

use crate::record::{RecordId, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What caused the ordered sequence to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderChangeTrigger {
    /// Drag/drop near an arbitrary position
    MoveNear,
    /// Menu-driven tier assignment
    TierAssignment,
}

impl std::fmt::Display for OrderChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderChangeTrigger::MoveNear => write!(f, "MoveNear"),
            OrderChangeTrigger::TierAssignment => write!(f, "TierAssignment"),
        }
    }
}

/// Triage event types
///
/// Events are broadcast via EventBus and serialized as-is for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TriageEvent {
    /// A sync against the remote source started
    SyncStarted {
        sync_id: Uuid,
        /// True when the replica was empty at the start
        initial: bool,
        timestamp: DateTime<Utc>,
    },

    /// A sync merged successfully
    SyncCompleted {
        sync_id: Uuid,
        new_count: usize,
        modified_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A sync failed; local state is unchanged
    SyncFailed {
        sync_id: Uuid,
        message: String,
        /// Records successfully processed before the failure
        processed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Records were manually reordered
    OrderChanged {
        trigger: OrderChangeTrigger,
        record_ids: Vec<RecordId>,
        /// Target tier for tier assignments
        tier: Option<Tier>,
        timestamp: DateTime<Utc>,
    },

    /// Tags on a record were edited
    TagsChanged {
        record_id: RecordId,
        tags: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Records were marked or unmarked as new/changed in place
    NewMarkerChanged {
        record_ids: Vec<RecordId>,
        is_new: bool,
        timestamp: DateTime<Utc>,
    },
}

impl TriageEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TriageEvent::SyncStarted { .. } => "SyncStarted",
            TriageEvent::SyncCompleted { .. } => "SyncCompleted",
            TriageEvent::SyncFailed { .. } => "SyncFailed",
            TriageEvent::OrderChanged { .. } => "OrderChanged",
            TriageEvent::TagsChanged { .. } => "TagsChanged",
            TriageEvent::NewMarkerChanged { .. } => "NewMarkerChanged",
        }
    }
}

/// Broadcast bus for TriageEvent
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TriageEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Events beyond `capacity` that no receiver has consumed are dropped for
    /// lagging receivers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TriageEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TriageEvent,
    ) -> Result<usize, broadcast::error::SendError<TriageEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TriageEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
