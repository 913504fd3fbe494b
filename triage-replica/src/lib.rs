//! triage-replica library
//!
//! Local, reorderable replica of a remote bug list. Records pulled from a
//! [`source::RecordSource`] are kept in one ordered sequence split into
//! High/Medium/Low tiers; manual reorders and tier assignments survive every
//! later sync.

pub mod api;
pub mod db;
pub mod error;
pub mod replica;
pub mod source;
pub mod state;
pub mod sync;

pub use error::{Error, Result};
pub use replica::Replica;
pub use state::SharedState;
pub use sync::{SyncService, SyncSummary};
