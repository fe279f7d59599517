//! Deletion markers and their retention policy.
//!
//! A tombstone for id X dominates any copy of X whose `updated_at` is at or
//! before `deleted_at`; a copy edited after the deletion resurrects the record.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{RecordKind, SyncRecord};

/// How long a tombstone is kept before pruning (30 days).
pub const TOMBSTONE_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Durable marker recording that a record was deleted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Collection of the deleted record
    #[serde(rename = "type")]
    pub kind: RecordKind,
    /// Identifier of the deleted record
    pub id: String,
    /// Deletion timestamp (Unix ms)
    pub deleted_at: i64,
}

impl Tombstone {
    #[must_use]
    pub fn new(kind: RecordKind, id: impl Into<String>, deleted_at: i64) -> Self {
        Self {
            kind,
            id: id.into(),
            deleted_at,
        }
    }

    /// Whether this tombstone has outlived the retention window at `now_ms`
    #[must_use]
    pub const fn is_expired(&self, now_ms: i64) -> bool {
        self.deleted_at < now_ms - TOMBSTONE_RETENTION_MS
    }
}

/// Drop tombstones older than the retention window.
#[must_use]
pub fn prune_tombstones(tombstones: &[Tombstone], now_ms: i64) -> Vec<Tombstone> {
    tombstones
        .iter()
        .filter(|tombstone| !tombstone.is_expired(now_ms))
        .cloned()
        .collect()
}

/// Union of tombstone sets keeping the latest `deleted_at` per record.
///
/// Output is sorted by kind then id so encoded snapshots are stable.
#[must_use]
pub fn union_tombstones(sets: &[&[Tombstone]]) -> Vec<Tombstone> {
    let mut latest: BTreeMap<(RecordKind, &str), i64> = BTreeMap::new();
    for tombstone in sets.iter().flat_map(|set| set.iter()) {
        latest
            .entry((tombstone.kind, tombstone.id.as_str()))
            .and_modify(|deleted_at| *deleted_at = (*deleted_at).max(tombstone.deleted_at))
            .or_insert(tombstone.deleted_at);
    }

    latest
        .into_iter()
        .map(|((kind, id), deleted_at)| Tombstone::new(kind, id, deleted_at))
        .collect()
}

/// Lookup table answering "is this record suppressed by a deletion?"
#[derive(Debug, Clone, Default)]
pub struct TombstoneIndex<'a> {
    entries: HashMap<(RecordKind, &'a str), i64>,
}

impl<'a> TombstoneIndex<'a> {
    #[must_use]
    pub fn new(tombstones: &'a [Tombstone]) -> Self {
        let mut entries = HashMap::with_capacity(tombstones.len());
        for tombstone in tombstones {
            entries
                .entry((tombstone.kind, tombstone.id.as_str()))
                .and_modify(|deleted_at: &mut i64| {
                    *deleted_at = (*deleted_at).max(tombstone.deleted_at);
                })
                .or_insert(tombstone.deleted_at);
        }
        Self { entries }
    }

    /// Deletion time recorded for a record, if any
    #[must_use]
    pub fn deleted_at(&self, kind: RecordKind, id: &str) -> Option<i64> {
        self.entries.get(&(kind, id)).copied()
    }

    /// True when a tombstone exists with `deleted_at >= record.updated_at`
    #[must_use]
    pub fn suppresses<T: SyncRecord>(&self, record: &T) -> bool {
        self.deleted_at(T::KIND, record.id())
            .is_some_and(|deleted_at| deleted_at >= record.updated_at())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
