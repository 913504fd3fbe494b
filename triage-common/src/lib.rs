//! # Triage Common Library
//!
//! Shared code for the triage workspace including:
//! - Record, comment and attachment models
//! - Severity ordering and priority tiers
//! - Tag palette
//! - Event types (TriageEvent enum) and EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod record;
pub mod tags;

pub use error::{Error, Result};
pub use record::{Attachment, Comment, Record, RecordId, Severity, Tier};
pub use tags::{TagColor, TagDef, TagPalette};
