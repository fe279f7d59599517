//! Change sets between the last agreed snapshot and each side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{RecordKind, Setlist, Song, SyncRecord};
use crate::snapshot::Snapshot;
use crate::tombstone::{union_tombstones, Tombstone, TombstoneIndex};

/// How a record changed relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// One changed record, as shown to the user for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub id: String,
    pub name: String,
    pub change: ChangeKind,
}

impl ChangeItem {
    fn new<T: SyncRecord>(record: &T, change: ChangeKind) -> Self {
        Self {
            kind: T::KIND,
            id: record.id().to_string(),
            name: record.display_name().to_string(),
            change,
        }
    }

    /// Whether this item refers to the same record as `other`
    #[must_use]
    pub fn same_record(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Changes made remotely (`incoming`) and locally (`outgoing`) since the
/// baseline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDiff {
    pub incoming: Vec<ChangeItem>,
    pub outgoing: Vec<ChangeItem>,
}

impl SyncDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty()
    }

    fn outgoing_edit(&self, kind: RecordKind, id: &str) -> bool {
        self.outgoing.iter().any(|item| {
            item.kind == kind && item.id == id && item.change != ChangeKind::Deleted
        })
    }
}

fn diff_collection<T: SyncRecord>(
    current: &[T],
    baseline: &[T],
    tombstones: &TombstoneIndex<'_>,
) -> Vec<ChangeItem> {
    let baseline_by_id = baseline
        .iter()
        .map(|record| (record.id(), record))
        .collect::<BTreeMap<_, _>>();
    let current_by_id = current
        .iter()
        .map(|record| (record.id(), record))
        .collect::<BTreeMap<_, _>>();

    let mut changes = BTreeMap::new();
    for (id, record) in &current_by_id {
        let suppressed = tombstones.suppresses(*record);
        match baseline_by_id.get(id) {
            // A record that is both new and tombstoned never really existed
            // on this side.
            None if suppressed => {}
            None => {
                changes.insert(*id, ChangeItem::new(*record, ChangeKind::Added));
            }
            Some(_) if suppressed => {
                changes.insert(*id, ChangeItem::new(*record, ChangeKind::Deleted));
            }
            Some(base) if record.updated_at() > base.updated_at() => {
                changes.insert(*id, ChangeItem::new(*record, ChangeKind::Modified));
            }
            Some(_) => {}
        }
    }
    for (id, record) in &baseline_by_id {
        if !current_by_id.contains_key(id) {
            changes.insert(*id, ChangeItem::new(*record, ChangeKind::Deleted));
        }
    }

    changes.into_values().collect()
}

fn diff_side(current: &Snapshot, baseline: &Snapshot, tombstones: &[Tombstone]) -> Vec<ChangeItem> {
    let index = TombstoneIndex::new(tombstones);
    let mut changes = diff_collection(&current.songs, &baseline.songs, &index);
    changes.extend(diff_collection(&current.setlists, &baseline.setlists, &index));
    changes
}

/// Tombstones implied by records that were in the baseline but are gone from
/// `current`.
fn inferred_tombstones(current: &Snapshot, baseline: &Snapshot, now_ms: i64) -> Vec<Tombstone> {
    fn missing<'a, T: SyncRecord>(
        current: &'a [T],
        baseline: &'a [T],
        now_ms: i64,
    ) -> impl Iterator<Item = Tombstone> + 'a {
        baseline
            .iter()
            .filter(move |base| !current.iter().any(|record| record.id() == base.id()))
            .map(move |base| Tombstone::new(T::KIND, base.id(), now_ms))
    }

    missing(&current.songs, &baseline.songs, now_ms)
        .chain(missing(&current.setlists, &baseline.setlists, now_ms))
        .collect()
}

/// Whether a local deletion loses to a remote copy edited after it
fn restored_by_remote(
    item: &ChangeItem,
    incoming: &[ChangeItem],
    remote: &Snapshot,
    local_tombstones: &TombstoneIndex<'_>,
) -> bool {
    if item.change != ChangeKind::Deleted {
        return false;
    }
    let edited_remotely = incoming
        .iter()
        .any(|change| change.same_record(item) && change.change != ChangeKind::Deleted);
    edited_remotely
        && match item.kind {
            RecordKind::Song => remote
                .find_song(&item.id)
                .is_some_and(|song| !local_tombstones.suppresses(song)),
            RecordKind::Setlist => remote
                .find_setlist(&item.id)
                .is_some_and(|setlist| !local_tombstones.suppresses(setlist)),
        }
}

/// Compute outgoing and incoming change sets.
///
/// A missing baseline is treated as empty, so everything on either side shows
/// up as `added`.
#[must_use]
pub fn compute_diff(
    local: &Snapshot,
    baseline: Option<&Snapshot>,
    remote: &Snapshot,
    local_tombstones: &[Tombstone],
    now_ms: i64,
) -> SyncDiff {
    let empty = Snapshot::empty(0);
    let baseline = baseline.unwrap_or(&empty);

    let outgoing = diff_side(local, baseline, local_tombstones);

    let inferred = inferred_tombstones(remote, baseline, now_ms);
    let incoming_tombstones =
        union_tombstones(&[inferred.as_slice(), remote.tombstones.as_slice()]);
    let incoming = diff_side(remote, baseline, &incoming_tombstones);

    let local_index = TombstoneIndex::new(local_tombstones);
    let outgoing = outgoing
        .into_iter()
        .filter(|item| !restored_by_remote(item, &incoming, remote, &local_index))
        .collect();

    SyncDiff { incoming, outgoing }
}

fn apply_collection<T: SyncRecord>(
    local: &[T],
    remote: &[T],
    diff: &SyncDiff,
    local_index: &TombstoneIndex<'_>,
    remote_index: &TombstoneIndex<'_>,
    now_ms: i64,
    removed: &mut Vec<Tombstone>,
) -> Vec<T> {
    let mut records = local
        .iter()
        .map(|record| (record.id().to_string(), record.clone()))
        .collect::<BTreeMap<_, _>>();

    for item in diff.incoming.iter().filter(|item| item.kind == T::KIND) {
        match item.change {
            ChangeKind::Added | ChangeKind::Modified => {
                let Some(incoming) = remote.iter().find(|record| record.id() == item.id) else {
                    continue;
                };
                if local_index.suppresses(incoming) {
                    continue;
                }
                let keep_local = records
                    .get(&item.id)
                    .is_some_and(|existing| existing.updated_at() >= incoming.updated_at());
                if !keep_local {
                    records.insert(item.id.clone(), incoming.clone());
                }
            }
            ChangeKind::Deleted => {
                let Some(existing) = records.get(&item.id) else {
                    continue;
                };
                let explicit = remote_index.deleted_at(T::KIND, &item.id);
                let dominated = explicit.is_some_and(|deleted_at| deleted_at >= existing.updated_at());
                if diff.outgoing_edit(T::KIND, &item.id) && !dominated {
                    continue;
                }
                records.remove(&item.id);
                removed.push(Tombstone::new(
                    T::KIND,
                    item.id.clone(),
                    explicit.unwrap_or(now_ms),
                ));
            }
        }
    }

    records.into_values().collect()
}

/// Apply every incoming change to the local snapshot.
///
/// Incoming additions and edits are adopted unless a local tombstone or a
/// newer local copy wins. Incoming deletions remove the local copy unless it
/// was edited locally since the baseline and no remote tombstone dominates the
/// edit. The returned snapshot carries the union of local tombstones, remote
/// tombstones and one tombstone per record removed here.
#[must_use]
pub fn apply_incoming(
    local: &Snapshot,
    remote: &Snapshot,
    diff: &SyncDiff,
    local_tombstones: &[Tombstone],
    now_ms: i64,
) -> Snapshot {
    let local_index = TombstoneIndex::new(local_tombstones);
    let remote_index = TombstoneIndex::new(&remote.tombstones);
    let mut removed = Vec::new();

    let songs: Vec<Song> = apply_collection(
        &local.songs,
        &remote.songs,
        diff,
        &local_index,
        &remote_index,
        now_ms,
        &mut removed,
    );
    let setlists: Vec<Setlist> = apply_collection(
        &local.setlists,
        &remote.setlists,
        diff,
        &local_index,
        &remote_index,
        now_ms,
        &mut removed,
    );

    let tombstones = union_tombstones(&[
        local_tombstones,
        remote.tombstones.as_slice(),
        removed.as_slice(),
    ]);
    Snapshot::new(now_ms, songs, setlists, tombstones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song(id: &str, updated_at: i64) -> Song {
        let mut song = Song::new(format!("Song {id}"));
        song.id = id.to_string();
        song.updated_at = updated_at;
        song
    }

    fn songs(songs: Vec<Song>) -> Snapshot {
        Snapshot::new(0, songs, Vec::new(), Vec::new())
    }

    fn item(id: &str, change: ChangeKind) -> ChangeItem {
        ChangeItem {
            kind: RecordKind::Song,
            id: id.to_string(),
            name: format!("Song {id}"),
            change,
        }
    }

    #[test]
    fn missing_baseline_reports_everything_as_added() {
        let local = songs(vec![song("a", 1)]);
        let remote = songs(vec![song("b", 2)]);

        let diff = compute_diff(&local, None, &remote, &[], 10);
        assert_eq!(diff.outgoing, vec![item("a", ChangeKind::Added)]);
        assert_eq!(diff.incoming, vec![item("b", ChangeKind::Added)]);
    }

    #[test]
    fn concurrent_edit_is_modified_on_both_sides() {
        let baseline = songs(vec![song("x", 100)]);
        let local = songs(vec![song("x", 200)]);
        let remote = songs(vec![song("x", 150)]);

        let diff = compute_diff(&local, Some(&baseline), &remote, &[], 1_000);
        assert_eq!(diff.outgoing, vec![item("x", ChangeKind::Modified)]);
        assert_eq!(diff.incoming, vec![item("x", ChangeKind::Modified)]);
    }

    #[test]
    fn unchanged_records_are_not_reported() {
        let baseline = songs(vec![song("x", 100)]);
        let diff = compute_diff(&baseline, Some(&baseline), &baseline, &[], 1_000);
        assert!(diff.is_empty());
    }

    #[test]
    fn local_deletion_is_outgoing() {
        let baseline = songs(vec![song("x", 100), song("y", 100)]);
        let local = songs(vec![song("y", 100)]);
        let tombstones = vec![Tombstone::new(RecordKind::Song, "x", 300)];

        let diff = compute_diff(&local, Some(&baseline), &baseline, &tombstones, 1_000);
        assert_eq!(diff.outgoing, vec![item("x", ChangeKind::Deleted)]);
        assert!(diff.incoming.is_empty());
    }

    #[test]
    fn remote_edit_after_local_deletion_is_not_outgoing() {
        let baseline = songs(vec![song("x", 100)]);
        let remote = songs(vec![song("x", 500)]);
        let tombstones = vec![Tombstone::new(RecordKind::Song, "x", 300)];

        let diff = compute_diff(&songs(Vec::new()), Some(&baseline), &remote, &tombstones, 1_000);
        assert!(diff.outgoing.is_empty());
        assert_eq!(diff.incoming, vec![item("x", ChangeKind::Modified)]);

        let applied = apply_incoming(&songs(Vec::new()), &remote, &diff, &tombstones, 1_000);
        assert_eq!(applied.find_song("x").unwrap().updated_at, 500);
    }

    #[test]
    fn local_deletion_after_remote_edit_stays_outgoing() {
        let baseline = songs(vec![song("x", 100)]);
        let remote = songs(vec![song("x", 200)]);
        let tombstones = vec![Tombstone::new(RecordKind::Song, "x", 300)];

        let diff = compute_diff(&songs(Vec::new()), Some(&baseline), &remote, &tombstones, 1_000);
        assert_eq!(diff.outgoing, vec![item("x", ChangeKind::Deleted)]);
    }

    #[test]
    fn remote_tombstone_marks_present_record_deleted() {
        let baseline = songs(vec![song("x", 100)]);
        let mut remote = songs(vec![song("x", 100)]);
        remote.tombstones = vec![Tombstone::new(RecordKind::Song, "x", 120)];

        let diff = compute_diff(&baseline, Some(&baseline), &remote, &[], 1_000);
        assert_eq!(diff.incoming, vec![item("x", ChangeKind::Deleted)]);
    }

    #[test]
    fn remote_removal_is_incoming_deletion() {
        let baseline = songs(vec![song("x", 100)]);
        let diff = compute_diff(&baseline, Some(&baseline), &songs(Vec::new()), &[], 1_000);
        assert_eq!(diff.incoming, vec![item("x", ChangeKind::Deleted)]);
        assert!(diff.outgoing.is_empty());
    }

    #[test]
    fn apply_incoming_adopts_newer_remote_copy() {
        let baseline = songs(vec![song("x", 100)]);
        let local = songs(vec![song("x", 100)]);
        let remote = songs(vec![song("x", 150), song("new", 20)]);

        let diff = compute_diff(&local, Some(&baseline), &remote, &[], 1_000);
        let applied = apply_incoming(&local, &remote, &diff, &[], 1_000);

        assert_eq!(applied.find_song("x").unwrap().updated_at, 150);
        assert!(applied.find_song("new").is_some());
    }

    #[test]
    fn apply_incoming_keeps_newer_local_copy() {
        let baseline = songs(vec![song("x", 100)]);
        let local = songs(vec![song("x", 200)]);
        let remote = songs(vec![song("x", 150)]);

        let diff = compute_diff(&local, Some(&baseline), &remote, &[], 1_000);
        let applied = apply_incoming(&local, &remote, &diff, &[], 1_000);
        assert_eq!(applied.find_song("x").unwrap().updated_at, 200);
    }

    #[test]
    fn apply_incoming_respects_local_tombstone() {
        let local = songs(Vec::new());
        let remote = songs(vec![song("x", 50)]);
        let tombstones = vec![Tombstone::new(RecordKind::Song, "x", 100)];

        let diff = compute_diff(&local, None, &remote, &tombstones, 1_000);
        let applied = apply_incoming(&local, &remote, &diff, &tombstones, 1_000);
        assert!(applied.songs.is_empty());
    }

    #[test]
    fn apply_incoming_deletion_records_tombstone() {
        let baseline = songs(vec![song("x", 100)]);
        let remote = songs(Vec::new());

        let diff = compute_diff(&baseline, Some(&baseline), &remote, &[], 1_000);
        let applied = apply_incoming(&baseline, &remote, &diff, &[], 1_000);

        assert!(applied.songs.is_empty());
        assert_eq!(
            applied.tombstones,
            vec![Tombstone::new(RecordKind::Song, "x", 1_000)]
        );
    }

    #[test]
    fn apply_incoming_deletion_spares_local_edit() {
        let baseline = songs(vec![song("x", 100)]);
        let local = songs(vec![song("x", 200)]);
        let remote = songs(Vec::new());

        let diff = compute_diff(&local, Some(&baseline), &remote, &[], 1_000);
        let applied = apply_incoming(&local, &remote, &diff, &[], 1_000);
        assert_eq!(applied.find_song("x").unwrap().updated_at, 200);
    }
}
