//! Setlist model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{new_record_id, RecordKind, SyncRecord};

/// An ordered list of songs for a performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setlist {
    /// Unique identifier
    pub id: String,
    /// Setlist name
    #[serde(default)]
    pub name: String,
    /// Song identifiers in performance order
    #[serde(default)]
    pub song_ids: Vec<String>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Unknown fields preserved across round trips
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Setlist {
    /// Create a new empty setlist
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: new_record_id(),
            name: name.into(),
            song_ids: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    /// Set `updated_at` to `now_ms`, never moving it backwards
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at + 1);
    }

    /// Remove every occurrence of a song; returns whether anything changed
    pub fn remove_song(&mut self, song_id: &str) -> bool {
        let before = self.song_ids.len();
        self.song_ids.retain(|id| id != song_id);
        self.song_ids.len() != before
    }
}

impl SyncRecord for Setlist {
    const KIND: RecordKind = RecordKind::Setlist;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
