//! Pull / merge / push orchestration.
//!
//! An attempt is retried exactly once when the push reports a conflict. The
//! retry replays the whole attempt from a fresh pull; a stale payload is never
//! resent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::SyncConfig;
use super::diff::{apply_incoming, compute_diff, ChangeItem, ChangeKind, SyncDiff};
use super::error::{SyncError, SyncResult};
use super::merge::merge_snapshots;
use super::remote::{PulledSnapshot, RemoteSyncPort};
use crate::models::{RecordKind, Setlist, Song};
use crate::snapshot::Snapshot;
use crate::store::ProfileStore;
use crate::tombstone::{prune_tombstones, union_tombstones, Tombstone, TombstoneIndex};
use crate::util::now_ms;

/// Where the engine is in the sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Pulling,
    /// Waiting for the user to pick outgoing changes
    Review,
    Pushing,
    Success,
    Error,
}

/// Outcome of a successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// No remote document existed; the local state was written as the first one
    Created,
    /// Changes were pushed
    Synced,
    /// Nothing needed to be written
    UpToDate,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Synced => "synced",
            Self::UpToDate => "up-to-date",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncStatus,
    pub song_count: usize,
    pub setlist_count: usize,
    /// Remote version after the sync
    pub version_token: String,
}

impl SyncReport {
    fn new(status: SyncStatus, snapshot: &Snapshot, version_token: impl Into<String>) -> Self {
        Self {
            status,
            song_count: snapshot.songs.len(),
            setlist_count: snapshot.setlists.len(),
            version_token: version_token.into(),
        }
    }
}

/// State carried from `pull_and_diff` to `push_selected`
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewContext {
    /// Remote document as pulled
    pub remote: Snapshot,
    /// Version the remote document was pulled at
    pub version_token: String,
    /// Local state after incoming changes were applied
    pub local: Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    pub diff: SyncDiff,
    pub context: ReviewContext,
}

/// Result of the first half of a reviewed sync
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// There was no remote document, so the local state was pushed as is
    Created(SyncReport),
    /// Incoming changes were applied; outgoing changes await selection
    Review(PendingReview),
}

/// Drives one profile against one remote.
///
/// The engine holds the profile's [`SyncConfig`] mutably for its whole
/// lifetime, so two syncs over the same config cannot overlap.
pub struct SyncEngine<'a, S, R> {
    store: &'a S,
    remote: &'a R,
    config: &'a mut SyncConfig,
    clock: fn() -> i64,
    state: SyncState,
}

impl<'a, S, R> SyncEngine<'a, S, R>
where
    S: ProfileStore,
    R: RemoteSyncPort,
{
    pub fn new(store: &'a S, remote: &'a R, config: &'a mut SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
            clock: now_ms,
            state: SyncState::Idle,
        }
    }

    /// Replace the wall clock (Unix ms), for deterministic tests
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &*self.config
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "Sync state changed");
            self.state = next;
        }
    }

    fn ensure_configured(&self) -> SyncResult<()> {
        if self.remote.is_configured() {
            Ok(())
        } else {
            Err(SyncError::NotConfigured(self.config.kind()))
        }
    }

    fn finish(&mut self, result: SyncResult<SyncReport>) -> SyncResult<SyncReport> {
        match &result {
            Ok(report) => {
                self.transition(SyncState::Success);
                tracing::info!(
                    adapter = %self.config.kind(),
                    status = %report.status,
                    songs = report.song_count,
                    setlists = report.setlist_count,
                    "Sync finished"
                );
            }
            Err(error) => {
                self.transition(SyncState::Error);
                tracing::error!(adapter = %self.config.kind(), %error, "Sync failed");
            }
        }
        result
    }

    /// Pull, merge, apply locally and push, retrying once on conflict.
    pub async fn sync(&mut self) -> SyncResult<SyncReport> {
        let result = match self.ensure_configured() {
            Ok(()) => match self.attempt().await {
                Err(error) if error.is_conflict() => {
                    tracing::warn!(
                        adapter = %self.config.kind(),
                        "Remote changed during sync, retrying from a fresh pull"
                    );
                    self.attempt().await
                }
                other => other,
            },
            Err(error) => Err(error),
        };
        self.finish(result)
    }

    /// Prune expired tombstones and read both sides
    async fn begin_attempt(&mut self) -> SyncResult<(Snapshot, Option<PulledSnapshot>)> {
        self.transition(SyncState::Pulling);
        let now = (self.clock)();
        let pruned = self.store.prune_tombstones(now).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired tombstones before sync");
        }

        let local = self.store.export_all().await?;
        let pulled = self.remote.pull().await?;
        if let Some(pulled) = &pulled {
            tracing::debug!(
                songs = pulled.snapshot.songs.len(),
                setlists = pulled.snapshot.setlists.len(),
                tombstones = pulled.snapshot.tombstones.len(),
                "Pulled remote snapshot"
            );
        }
        Ok((local, pulled))
    }

    async fn attempt(&mut self) -> SyncResult<SyncReport> {
        let (local, pulled) = self.begin_attempt().await?;
        let Some(pulled) = pulled else {
            return self.push_initial(local).await;
        };

        let now = (self.clock)();
        let merged = merge_snapshots(&local, &pulled.snapshot, &local.tombstones);
        let tombstones = prune_tombstones(
            &union_tombstones(&[
                local.tombstones.as_slice(),
                pulled.snapshot.tombstones.as_slice(),
            ]),
            now,
        );
        let result = Snapshot::new(now, merged.songs, merged.setlists, tombstones);

        self.store.import_with_tombstones(&result).await?;

        if result.same_content(&pulled.snapshot) {
            self.record_success(&pulled.version_token, &pulled.snapshot)
                .await?;
            return Ok(SyncReport::new(
                SyncStatus::UpToDate,
                &result,
                pulled.version_token,
            ));
        }

        self.transition(SyncState::Pushing);
        let token = self
            .remote
            .push(&result, Some(&pulled.version_token))
            .await?;
        self.record_success(&token, &result).await?;
        Ok(SyncReport::new(SyncStatus::Synced, &result, token))
    }

    /// No remote document yet: write the local state unconditionally
    async fn push_initial(&mut self, local: Snapshot) -> SyncResult<SyncReport> {
        self.transition(SyncState::Pushing);
        let snapshot = Snapshot::new(
            (self.clock)(),
            local.songs,
            local.setlists,
            local.tombstones,
        );
        let token = self.remote.push(&snapshot, None).await?;
        self.record_success(&token, &snapshot).await?;
        Ok(SyncReport::new(SyncStatus::Created, &snapshot, token))
    }

    /// Persist the new version token and the agreed snapshot
    async fn record_success(&mut self, version_token: &str, agreed: &Snapshot) -> SyncResult<()> {
        self.config.record_sync(version_token, (self.clock)());
        self.store.save_sync_config(self.config).await?;
        self.store.save_baseline(self.config.kind(), agreed).await?;
        Ok(())
    }

    /// First half of a reviewed sync.
    ///
    /// Incoming changes are applied to the local store immediately; outgoing
    /// changes are returned for selection.
    pub async fn pull_and_diff(&mut self) -> SyncResult<PullOutcome> {
        let result = match self.ensure_configured() {
            Ok(()) => self.review_attempt().await,
            Err(error) => Err(error),
        };

        match result {
            Ok(PullOutcome::Review(pending)) => {
                self.transition(SyncState::Review);
                tracing::info!(
                    incoming = pending.diff.incoming.len(),
                    outgoing = pending.diff.outgoing.len(),
                    "Remote changes applied, outgoing changes awaiting review"
                );
                Ok(PullOutcome::Review(pending))
            }
            Ok(PullOutcome::Created(report)) => self.finish(Ok(report)).map(PullOutcome::Created),
            Err(error) => self.finish(Err(error)).map(PullOutcome::Created),
        }
    }

    async fn review_attempt(&mut self) -> SyncResult<PullOutcome> {
        let (local, pulled) = self.begin_attempt().await?;
        let Some(pulled) = pulled else {
            return self.push_initial(local).await.map(PullOutcome::Created);
        };

        let now = (self.clock)();
        let baseline = self.store.load_baseline(self.config.kind()).await?;
        let diff = compute_diff(
            &local,
            baseline.as_ref(),
            &pulled.snapshot,
            &local.tombstones,
            now,
        );
        let applied = apply_incoming(&local, &pulled.snapshot, &diff, &local.tombstones, now);
        let applied = Snapshot {
            tombstones: prune_tombstones(&applied.tombstones, now),
            ..applied
        };

        self.store.import_with_tombstones(&applied).await?;
        // The pulled document is the new common ground for the next diff.
        self.store
            .save_baseline(self.config.kind(), &pulled.snapshot)
            .await?;

        Ok(PullOutcome::Review(PendingReview {
            diff,
            context: ReviewContext {
                remote: pulled.snapshot,
                version_token: pulled.version_token,
                local: applied,
            },
        }))
    }

    /// Second half of a reviewed sync: push the remote state plus the selected
    /// outgoing changes.
    ///
    /// On conflict the pull and diff are redone, the selection is narrowed to
    /// entries still present in the fresh outgoing set, and the push is tried
    /// once more.
    pub async fn push_selected(
        &mut self,
        context: &ReviewContext,
        selected: &[ChangeItem],
    ) -> SyncResult<SyncReport> {
        let result = match self.ensure_configured() {
            Ok(()) => match self.push_selection(context, selected).await {
                Err(error) if error.is_conflict() => {
                    tracing::warn!(
                        adapter = %self.config.kind(),
                        "Remote changed during review, replaying pull before retrying"
                    );
                    self.retry_selection(selected).await
                }
                other => other,
            },
            Err(error) => Err(error),
        };
        self.finish(result)
    }

    async fn retry_selection(&mut self, selected: &[ChangeItem]) -> SyncResult<SyncReport> {
        match self.review_attempt().await? {
            PullOutcome::Created(report) => Ok(report),
            PullOutcome::Review(pending) => {
                let still_pending = selected
                    .iter()
                    .filter(|item| {
                        pending
                            .diff
                            .outgoing
                            .iter()
                            .any(|fresh| fresh.same_record(item))
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                self.push_selection(&pending.context, &still_pending).await
            }
        }
    }

    async fn push_selection(
        &mut self,
        context: &ReviewContext,
        selected: &[ChangeItem],
    ) -> SyncResult<SyncReport> {
        let now = (self.clock)();
        let outgoing = build_outgoing(context, selected, now);

        if outgoing.same_content(&context.remote) {
            self.record_success(&context.version_token, &context.remote)
                .await?;
            return Ok(SyncReport::new(
                SyncStatus::UpToDate,
                &context.remote,
                context.version_token.clone(),
            ));
        }

        self.transition(SyncState::Pushing);
        let token = self
            .remote
            .push(&outgoing, Some(&context.version_token))
            .await?;
        self.record_success(&token, &outgoing).await?;
        Ok(SyncReport::new(SyncStatus::Synced, &outgoing, token))
    }
}

/// Remote records overlaid with the selected local changes
fn build_outgoing(context: &ReviewContext, selected: &[ChangeItem], now_ms: i64) -> Snapshot {
    let mut songs: BTreeMap<String, Song> = context
        .remote
        .songs
        .iter()
        .map(|song| (song.id.clone(), song.clone()))
        .collect();
    let mut setlists: BTreeMap<String, Setlist> = context
        .remote
        .setlists
        .iter()
        .map(|setlist| (setlist.id.clone(), setlist.clone()))
        .collect();
    let local_tombstones = TombstoneIndex::new(&context.local.tombstones);
    let mut deletions = Vec::new();

    for item in selected {
        match (item.change, item.kind) {
            (ChangeKind::Added | ChangeKind::Modified, RecordKind::Song) => {
                match context.local.find_song(&item.id) {
                    Some(song) => {
                        songs.insert(item.id.clone(), song.clone());
                    }
                    None => tracing::warn!(id = %item.id, "Selected song no longer exists locally"),
                }
            }
            (ChangeKind::Added | ChangeKind::Modified, RecordKind::Setlist) => {
                match context.local.find_setlist(&item.id) {
                    Some(setlist) => {
                        setlists.insert(item.id.clone(), setlist.clone());
                    }
                    None => {
                        tracing::warn!(id = %item.id, "Selected setlist no longer exists locally");
                    }
                }
            }
            (ChangeKind::Deleted, kind) => {
                let restored = match kind {
                    RecordKind::Song => context.local.find_song(&item.id).is_some(),
                    RecordKind::Setlist => context.local.find_setlist(&item.id).is_some(),
                };
                if restored {
                    tracing::warn!(id = %item.id, "Selected deletion was overtaken by a newer remote edit");
                    continue;
                }
                match kind {
                    RecordKind::Song => {
                        songs.remove(&item.id);
                    }
                    RecordKind::Setlist => {
                        setlists.remove(&item.id);
                    }
                }
                let deleted_at = local_tombstones
                    .deleted_at(kind, &item.id)
                    .unwrap_or(now_ms);
                deletions.push(Tombstone::new(kind, item.id.clone(), deleted_at));
            }
        }
    }

    let tombstones = prune_tombstones(
        &union_tombstones(&[context.remote.tombstones.as_slice(), deletions.as_slice()]),
        now_ms,
    );
    Snapshot::new(
        now_ms,
        songs.into_values().collect(),
        setlists.into_values().collect(),
        tombstones,
    )
}
