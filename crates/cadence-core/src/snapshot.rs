//! Versioned snapshot document exchanged with remotes and the local store.
//!
//! Version 1 documents have no `tombstones` array; version 2 adds it. Readers
//! accept both, writers always emit [`SNAPSHOT_VERSION`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{RecordKind, Setlist, Song, SyncRecord};
use crate::tombstone::Tombstone;

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Schema versions this build can read.
pub const SUPPORTED_SNAPSHOT_VERSIONS: [u32; 2] = [1, 2];

/// A document failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid snapshot: {0}")]
pub struct SchemaError(pub String);

/// Full exportable state of one profile at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: i64,
    pub songs: Vec<Song>,
    pub setlists: Vec<Setlist>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

impl Snapshot {
    /// Build a current-version snapshot.
    #[must_use]
    pub const fn new(
        exported_at: i64,
        songs: Vec<Song>,
        setlists: Vec<Setlist>,
        tombstones: Vec<Tombstone>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at,
            songs,
            setlists,
            tombstones,
        }
    }

    /// A snapshot with no records, used as the first-sync baseline.
    #[must_use]
    pub const fn empty(exported_at: i64) -> Self {
        Self::new(exported_at, Vec::new(), Vec::new(), Vec::new())
    }

    #[must_use]
    pub fn count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Song => self.songs.len(),
            RecordKind::Setlist => self.setlists.len(),
        }
    }

    #[must_use]
    pub fn find_song(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|song| song.id == id)
    }

    #[must_use]
    pub fn find_setlist(&self, id: &str) -> Option<&Setlist> {
        self.setlists.iter().find(|setlist| setlist.id == id)
    }

    /// Compare record and tombstone content, ignoring `version`,
    /// `exportedAt` and collection order.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        by_id(&self.songs) == by_id(&other.songs)
            && by_id(&self.setlists) == by_id(&other.setlists)
            && sorted_tombstones(&self.tombstones) == sorted_tombstones(&other.tombstones)
    }
}

fn by_id<T: SyncRecord + PartialEq>(records: &[T]) -> BTreeMap<&str, &T> {
    records.iter().map(|record| (record.id(), record)).collect()
}

fn sorted_tombstones(tombstones: &[Tombstone]) -> Vec<&Tombstone> {
    let mut sorted = tombstones.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| (a.kind, &a.id, a.deleted_at).cmp(&(b.kind, &b.id, b.deleted_at)));
    sorted
}

/// Structurally verify a candidate document.
///
/// The whole document is rejected on the first violation; callers never see a
/// partially valid snapshot.
pub fn validate(candidate: &Value) -> Result<Snapshot, SchemaError> {
    let object = candidate
        .as_object()
        .ok_or_else(|| SchemaError("document is not a JSON object".to_string()))?;

    let version = object
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| SchemaError("missing integer field 'version'".to_string()))?;
    if !SUPPORTED_SNAPSHOT_VERSIONS
        .iter()
        .any(|supported| u64::from(*supported) == version)
    {
        return Err(SchemaError(format!(
            "unsupported version {version} (expected one of {SUPPORTED_SNAPSHOT_VERSIONS:?})"
        )));
    }

    if !object.get("exportedAt").is_some_and(Value::is_i64) {
        return Err(SchemaError(
            "missing integer field 'exportedAt'".to_string(),
        ));
    }
    for field in ["songs", "setlists"] {
        if !object.get(field).is_some_and(Value::is_array) {
            return Err(SchemaError(format!("missing array field '{field}'")));
        }
    }
    match object.get("tombstones") {
        None | Some(Value::Null | Value::Array(_)) => {}
        Some(_) => return Err(SchemaError("'tombstones' must be an array".to_string())),
    }

    let mut normalized = candidate.clone();
    if let Some(map) = normalized.as_object_mut() {
        if map.get("tombstones").is_some_and(Value::is_null) {
            map.remove("tombstones");
        }
    }

    let snapshot: Snapshot =
        serde_json::from_value(normalized).map_err(|error| SchemaError(error.to_string()))?;

    check_ids(&snapshot.songs, "songs")?;
    check_ids(&snapshot.setlists, "setlists")?;
    if let Some(index) = snapshot
        .tombstones
        .iter()
        .position(|tombstone| tombstone.id.trim().is_empty())
    {
        return Err(SchemaError(format!("tombstones[{index}] has an empty id")));
    }

    Ok(snapshot)
}

fn check_ids<T: SyncRecord>(records: &[T], field: &str) -> Result<(), SchemaError> {
    match records
        .iter()
        .position(|record| record.id().trim().is_empty())
    {
        Some(index) => Err(SchemaError(format!("{field}[{index}] has an empty id"))),
        None => Ok(()),
    }
}

/// Serialize a snapshot as pretty-printed UTF-8 JSON.
pub fn encode(snapshot: &Snapshot) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot)
}

/// Parse and validate raw document bytes.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, SchemaError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|error| SchemaError(format!("document is not valid JSON: {error}")))?;
    validate(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn song(id: &str, updated_at: i64) -> Song {
        let mut song = Song::new(format!("Song {id}"));
        song.id = id.to_string();
        song.updated_at = updated_at;
        song
    }

    fn sample(version: u32) -> Snapshot {
        let mut setlist = Setlist::new("Friday");
        setlist.id = "set-1".into();
        setlist.song_ids = vec!["a".into()];
        setlist.updated_at = 30;

        Snapshot {
            version,
            exported_at: 1_700_000_000_000,
            songs: vec![song("a", 10), song("b", 20)],
            setlists: vec![setlist],
            tombstones: if version == 1 {
                Vec::new()
            } else {
                vec![Tombstone::new(RecordKind::Song, "gone", 5)]
            },
        }
    }

    #[test]
    fn round_trip_preserves_both_versions() {
        for version in SUPPORTED_SNAPSHOT_VERSIONS {
            let snapshot = sample(version);
            let bytes = encode(&snapshot).unwrap();
            assert_eq!(decode(&bytes).unwrap(), snapshot);
        }
    }

    #[test]
    fn version_one_without_tombstones_parses() {
        let document = json!({
            "version": 1,
            "exportedAt": 5,
            "songs": [{ "id": "a", "title": "A", "updatedAt": 1 }],
            "setlists": []
        });

        let snapshot = validate(&document).unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.tombstones.is_empty());
        assert_eq!(snapshot.songs.len(), 1);
    }

    #[test]
    fn null_tombstones_are_treated_as_empty() {
        let document = json!({
            "version": 2,
            "exportedAt": 5,
            "songs": [],
            "setlists": [],
            "tombstones": null
        });
        assert!(validate(&document).unwrap().tombstones.is_empty());
    }

    #[test]
    fn rejects_unsupported_version() {
        let document = json!({ "version": 3, "exportedAt": 0, "songs": [], "setlists": [] });
        let error = validate(&document).unwrap_err();
        assert!(error.to_string().contains("unsupported version 3"));
    }

    #[test]
    fn rejects_missing_collections() {
        let document = json!({ "version": 2, "exportedAt": 0, "songs": [] });
        let error = validate(&document).unwrap_err();
        assert!(error.0.contains("setlists"));
    }

    #[test]
    fn rejects_record_without_updated_at() {
        let document = json!({
            "version": 2,
            "exportedAt": 0,
            "songs": [{ "id": "a", "title": "A" }],
            "setlists": []
        });
        assert!(validate(&document).is_err());
    }

    #[test]
    fn rejects_malformed_tombstone() {
        let document = json!({
            "version": 2,
            "exportedAt": 0,
            "songs": [],
            "setlists": [],
            "tombstones": [{ "type": "album", "id": "x", "deletedAt": 1 }]
        });
        assert!(validate(&document).is_err());

        let document = json!({
            "version": 2,
            "exportedAt": 0,
            "songs": [],
            "setlists": [],
            "tombstones": [{ "type": "song", "id": " ", "deletedAt": 1 }]
        });
        assert!(validate(&document).unwrap_err().0.contains("tombstones[0]"));
    }

    #[test]
    fn rejects_empty_record_id() {
        let document = json!({
            "version": 1,
            "exportedAt": 0,
            "songs": [],
            "setlists": [{ "id": "", "name": "x", "updatedAt": 1 }]
        });
        assert!(validate(&document).unwrap_err().0.contains("setlists[0]"));
    }

    #[test]
    fn decode_rejects_non_json() {
        assert!(decode(b"not json").is_err());
        assert!(decode(b"[]").is_err());
    }

    #[test]
    fn same_content_ignores_order_and_export_time() {
        let a = sample(2);
        let mut b = sample(2);
        b.songs.reverse();
        b.exported_at += 1_000;
        b.version = 1;
        assert!(a.same_content(&b));

        b.songs[0].updated_at += 1;
        assert!(!a.same_content(&b));
    }
}
