//! Persistence boundaries used by the sync engine.
//!
//! The engine only ever talks to a profile through these traits. [`Database`]
//! is the durable implementation; [`MemoryStore`] backs tests and dry runs.
//!
//! [`Database`]: crate::db::Database

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::RecordKind;
use crate::snapshot::Snapshot;
use crate::sync::config::{RemoteKind, SyncConfig};
use crate::tombstone::{prune_tombstones, union_tombstones, Tombstone};
use crate::util::now_ms;

/// Whole-catalog import and export (async)
#[allow(async_fn_in_trait)]
pub trait LocalStore {
    /// Export every song, setlist and retained tombstone
    async fn export_all(&self) -> Result<Snapshot>;

    /// Replace all songs and setlists with the snapshot's records.
    ///
    /// Either every record lands or none do. Tombstones are not touched.
    async fn import_all(&self, snapshot: &Snapshot) -> Result<()>;

    /// Replace records and tombstones together with the snapshot's contents
    async fn import_with_tombstones(&self, snapshot: &Snapshot) -> Result<()>;

    /// Number of stored records of one kind
    async fn count_records(&self, kind: RecordKind) -> Result<usize>;
}

/// Deletion marker persistence (async)
#[allow(async_fn_in_trait)]
pub trait TombstoneStore {
    async fn list_tombstones(&self) -> Result<Vec<Tombstone>>;

    /// Insert a tombstone, keeping the later `deleted_at` when one exists
    async fn record_tombstone(&self, tombstone: &Tombstone) -> Result<()>;

    /// Replace the full tombstone set
    async fn replace_tombstones(&self, tombstones: &[Tombstone]) -> Result<()>;

    /// Drop expired tombstones; returns how many were removed
    async fn prune_tombstones(&self, now_ms: i64) -> Result<usize>;
}

/// Remote configuration persistence, one entry per adapter kind (async)
#[allow(async_fn_in_trait)]
pub trait SyncConfigStore {
    async fn load_sync_config(&self, kind: RemoteKind) -> Result<Option<SyncConfig>>;

    async fn list_sync_configs(&self) -> Result<Vec<SyncConfig>>;

    async fn save_sync_config(&self, config: &SyncConfig) -> Result<()>;

    /// Returns whether a config existed
    async fn delete_sync_config(&self, kind: RemoteKind) -> Result<bool>;
}

/// Last successfully synced snapshot per adapter kind (async)
#[allow(async_fn_in_trait)]
pub trait BaselineStore {
    async fn load_baseline(&self, kind: RemoteKind) -> Result<Option<Snapshot>>;

    async fn save_baseline(&self, kind: RemoteKind, snapshot: &Snapshot) -> Result<()>;

    async fn clear_baseline(&self, kind: RemoteKind) -> Result<()>;
}

/// Everything the sync engine needs from one profile
pub trait ProfileStore: LocalStore + TombstoneStore + SyncConfigStore + BaselineStore {}

impl<T> ProfileStore for T where T: LocalStore + TombstoneStore + SyncConfigStore + BaselineStore {}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Option<Snapshot>,
    tombstones: Vec<Tombstone>,
    configs: BTreeMap<RemoteKind, SyncConfig>,
    baselines: BTreeMap<RemoteKind, Snapshot>,
}

/// In-memory profile store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records and tombstones
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let tombstones = snapshot.tombstones.clone();
        Self {
            state: Mutex::new(MemoryState {
                snapshot: Some(Snapshot {
                    tombstones: Vec::new(),
                    ..snapshot
                }),
                tombstones,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Database("memory store lock poisoned".to_string()))
    }
}

impl LocalStore for MemoryStore {
    async fn export_all(&self) -> Result<Snapshot> {
        let state = self.lock()?;
        let (songs, setlists) = state
            .snapshot
            .as_ref()
            .map(|snapshot| (snapshot.songs.clone(), snapshot.setlists.clone()))
            .unwrap_or_default();
        Ok(Snapshot::new(
            now_ms(),
            songs,
            setlists,
            state.tombstones.clone(),
        ))
    }

    async fn import_all(&self, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.lock()?;
        state.snapshot = Some(Snapshot {
            tombstones: Vec::new(),
            ..snapshot.clone()
        });
        Ok(())
    }

    async fn import_with_tombstones(&self, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.lock()?;
        state.snapshot = Some(Snapshot {
            tombstones: Vec::new(),
            ..snapshot.clone()
        });
        state.tombstones = union_tombstones(&[snapshot.tombstones.as_slice()]);
        Ok(())
    }

    async fn count_records(&self, kind: RecordKind) -> Result<usize> {
        let state = self.lock()?;
        Ok(state
            .snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.count(kind)))
    }
}

impl TombstoneStore for MemoryStore {
    async fn list_tombstones(&self) -> Result<Vec<Tombstone>> {
        Ok(self.lock()?.tombstones.clone())
    }

    async fn record_tombstone(&self, tombstone: &Tombstone) -> Result<()> {
        let mut state = self.lock()?;
        state.tombstones = union_tombstones(&[state.tombstones.as_slice(), std::slice::from_ref(tombstone)]);
        Ok(())
    }

    async fn replace_tombstones(&self, tombstones: &[Tombstone]) -> Result<()> {
        self.lock()?.tombstones = union_tombstones(&[tombstones]);
        Ok(())
    }

    async fn prune_tombstones(&self, now_ms: i64) -> Result<usize> {
        let mut state = self.lock()?;
        let before = state.tombstones.len();
        state.tombstones = prune_tombstones(&state.tombstones, now_ms);
        Ok(before - state.tombstones.len())
    }
}

impl SyncConfigStore for MemoryStore {
    async fn load_sync_config(&self, kind: RemoteKind) -> Result<Option<SyncConfig>> {
        Ok(self.lock()?.configs.get(&kind).cloned())
    }

    async fn list_sync_configs(&self) -> Result<Vec<SyncConfig>> {
        Ok(self.lock()?.configs.values().cloned().collect())
    }

    async fn save_sync_config(&self, config: &SyncConfig) -> Result<()> {
        self.lock()?.configs.insert(config.kind(), config.clone());
        Ok(())
    }

    async fn delete_sync_config(&self, kind: RemoteKind) -> Result<bool> {
        let mut state = self.lock()?;
        state.baselines.remove(&kind);
        Ok(state.configs.remove(&kind).is_some())
    }
}

impl BaselineStore for MemoryStore {
    async fn load_baseline(&self, kind: RemoteKind) -> Result<Option<Snapshot>> {
        Ok(self.lock()?.baselines.get(&kind).cloned())
    }

    async fn save_baseline(&self, kind: RemoteKind, snapshot: &Snapshot) -> Result<()> {
        self.lock()?.baselines.insert(kind, snapshot.clone());
        Ok(())
    }

    async fn clear_baseline(&self, kind: RemoteKind) -> Result<()> {
        self.lock()?.baselines.remove(&kind);
        Ok(())
    }
}
