//! Record model
//!
//! A record is the local copy of one remotely tracked item (a bug report).
//! Descriptive fields are overwritten on every sync; `local_priority`, the
//! `is_new` flag, tags and the refresh flag are local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable remote identifier of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Remote ids are strictly positive
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId(id)
    }
}

/// Fixed severity ordering used to derive the automatic priority
///
/// The declaration order is the ranking: `Critical` first, `Enhancement` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Major,
    Normal,
    Minor,
    Enhancement,
}

impl Severity {
    /// All severities in ranking order
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::Major,
        Severity::Normal,
        Severity::Minor,
        Severity::Enhancement,
    ];

    /// Name as used by the remote service
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Normal => "Normal",
            Severity::Minor => "Minor",
            Severity::Enhancement => "Enhancement",
        }
    }

    /// Parse remote severity text; the name must match exactly
    pub fn parse(text: &str) -> Option<Severity> {
        Severity::ALL.iter().copied().find(|s| s.as_str() == text)
    }

    /// Position in the ranking (0 = Critical)
    pub fn rank(&self) -> usize {
        *self as usize
    }

    /// Automatic priority rank for arbitrary severity text
    ///
    /// Unrecognised text ranks -1, ahead of `Critical`, so records the
    /// ranking cannot place surface at the very top of the new block.
    pub fn auto_priority(text: &str) -> i32 {
        Severity::parse(text).map_or(-1, |s| s.rank() as i32)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three floating priority bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// All tiers, highest first
    pub const ALL: [Tier; 3] = [Tier::High, Tier::Medium, Tier::Low];

    /// Stable index (High = 0)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Tiers strictly above this one, nearest first
    pub fn above(&self) -> impl Iterator<Item = Tier> {
        let index = self.index();
        Tier::ALL.into_iter().rev().filter(move |t| t.index() < index)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::High => write!(f, "high"),
            Tier::Medium => write!(f, "medium"),
            Tier::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Tier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Tier::High),
            "medium" | "med" => Ok(Tier::Medium),
            "low" => Ok(Tier::Low),
            other => Err(crate::Error::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}

/// Attachment metadata carried by a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub description: String,
    pub content_type: String,
    pub attacher: String,
    pub creation_time: DateTime<Utc>,
    pub last_change_time: DateTime<Utc>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_obsolete: bool,
    #[serde(default)]
    pub is_url: bool,
    #[serde(default)]
    pub is_patch: bool,
}

/// Immutable comment entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Locally cached remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub summary: String,
    pub assignee: String,
    pub status: String,
    pub severity: String,
    pub target_milestone: String,
    pub component: String,
    pub operating_system: String,
    pub created_at: DateTime<Utc>,

    /// Zero-based position in the ordered sequence (recomputed, never set by hand)
    pub local_priority: usize,

    /// Not yet acknowledged by a manual reorder
    pub is_new: bool,

    /// Comment data could not be fetched on the last sync
    pub requires_refresh: bool,

    tags: Vec<String>,
    pub comments: Vec<Comment>,
}

impl Record {
    /// Create an empty record for `id`
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            summary: String::new(),
            assignee: String::new(),
            status: String::new(),
            severity: String::new(),
            target_milestone: String::new(),
            component: String::new(),
            operating_system: String::new(),
            created_at: DateTime::<Utc>::default(),
            local_priority: 0,
            is_new: false,
            requires_refresh: false,
            tags: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Rank of the severity in the fixed severity list
    pub fn auto_priority(&self) -> i32 {
        Severity::auto_priority(&self.severity)
    }

    /// User tags in insertion order
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Add a tag; returns false if it was already present
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    /// Remove a tag; returns false if it was absent
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn clear_tags(&mut self) {
        self.tags.clear();
    }
}
