//! Snapshot synchronization with a remote document host.
//!
//! A profile syncs against exactly one adapter at a time. [`SyncEngine`] pulls
//! the remote document, reconciles it with the local catalog and pushes the
//! result guarded by the version token it pulled.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod merge;
pub mod remote;

pub use config::{
    DropboxConfig, GitHubConfig, LocalFileConfig, RemoteConfig, RemoteKind, SyncConfig,
};
pub use diff::{apply_incoming, compute_diff, ChangeItem, ChangeKind, SyncDiff};
pub use engine::{
    PendingReview, PullOutcome, ReviewContext, SyncEngine, SyncReport, SyncState, SyncStatus,
};
pub use error::{SyncError, SyncResult};
pub use merge::{merge_snapshots, MergedRecords};
pub use remote::{
    DropboxRemote, GitHubRemote, LocalFileRemote, MemoryRemote, PulledSnapshot, Remote,
    RemoteSyncPort,
};
