//! Shared record identity and ordering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The two record collections carried by a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A song
    Song,
    /// A setlist
    Setlist,
}

impl RecordKind {
    /// Wire name of this kind (`"song"` / `"setlist"`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Song => "song",
            Self::Setlist => "setlist",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "song" => Ok(Self::Song),
            "setlist" => Ok(Self::Setlist),
            other => Err(format!("unknown record type '{other}'")),
        }
    }
}

/// A record that participates in snapshot diffing and merging.
///
/// `updated_at` is the only ordering signal: every local mutation must bump
/// it to the current time.
pub trait SyncRecord: Clone {
    /// Collection this record belongs to
    const KIND: RecordKind;

    /// Globally unique identifier
    fn id(&self) -> &str;

    /// Last update timestamp (Unix ms)
    fn updated_at(&self) -> i64;

    /// Human readable label used in change lists
    fn display_name(&self) -> &str;
}

/// Create a new record identifier using UUID v7 (time-sortable)
#[must_use]
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}
