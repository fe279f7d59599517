//! Song model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{new_record_id, RecordKind, SyncRecord};

/// A song in the catalog
///
/// Fields written by other clients that this build does not know about are
/// kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Unique identifier
    pub id: String,
    /// Song title
    #[serde(default)]
    pub title: String,
    /// Performing artist or composer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Musical key (e.g. "G", "Bbm")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Tempo in beats per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<u32>,
    /// ChordPro source text
    #[serde(default)]
    pub content: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp (Unix ms)
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Unknown fields preserved across round trips
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Song {
    /// Create a new song with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: new_record_id(),
            title: title.into(),
            artist: None,
            key: None,
            tempo: None,
            content: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    /// Set `updated_at` to `now_ms`, never moving it backwards
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at + 1);
    }
}

impl SyncRecord for Song {
    const KIND: RecordKind = RecordKind::Song;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn display_name(&self) -> &str {
        &self.title
    }
}
