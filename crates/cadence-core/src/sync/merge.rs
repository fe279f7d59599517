//! Whole-record last-writer-wins merge with tombstone-aware deletion.

use std::collections::BTreeMap;

use crate::models::{Setlist, Song, SyncRecord};
use crate::snapshot::Snapshot;
use crate::tombstone::{Tombstone, TombstoneIndex};

/// Record sets produced by [`merge_snapshots`], ordered by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecords {
    pub songs: Vec<Song>,
    pub setlists: Vec<Setlist>,
}

fn merge_collection<T: SyncRecord>(
    local: &[T],
    remote: &[T],
    local_tombstones: &TombstoneIndex<'_>,
    remote_tombstones: &TombstoneIndex<'_>,
) -> Vec<T> {
    let mut merged = local
        .iter()
        .filter(|record| !remote_tombstones.suppresses(*record))
        .map(|record| (record.id().to_string(), record.clone()))
        .collect::<BTreeMap<_, _>>();

    for incoming in remote {
        if local_tombstones.suppresses(incoming) || remote_tombstones.suppresses(incoming) {
            continue;
        }
        match merged.get(incoming.id()) {
            Some(existing) if existing.updated_at() >= incoming.updated_at() => {}
            _ => {
                merged.insert(incoming.id().to_string(), incoming.clone());
            }
        }
    }

    merged.into_values().collect()
}

/// Reconcile local and remote records.
///
/// Per id: a remote copy dominated by a local tombstone is discarded; a
/// remote copy with no local counterpart is adopted; otherwise the strictly
/// newer `updated_at` wins and ties keep the local copy. Tombstones carried by
/// the remote document remove local copies they dominate.
#[must_use]
pub fn merge_snapshots(
    local: &Snapshot,
    remote: &Snapshot,
    local_tombstones: &[Tombstone],
) -> MergedRecords {
    let local_index = TombstoneIndex::new(local_tombstones);
    let remote_index = TombstoneIndex::new(&remote.tombstones);

    MergedRecords {
        songs: merge_collection(&local.songs, &remote.songs, &local_index, &remote_index),
        setlists: merge_collection(
            &local.setlists,
            &remote.setlists,
            &local_index,
            &remote_index,
        ),
    }
}
