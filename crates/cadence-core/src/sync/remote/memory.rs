//! In-process remote used by tests and dry runs.
//!
//! The document is kept in encoded form so every pull goes through the same
//! decode and validation path as a real host.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{PulledSnapshot, RemoteSyncPort};
use crate::snapshot::{self, Snapshot};
use crate::sync::error::{SyncError, SyncResult};

#[derive(Debug)]
struct MemoryDocument {
    bytes: Vec<u8>,
    revision: String,
}

#[derive(Debug)]
struct MemoryRemoteState {
    document: Option<MemoryDocument>,
    next_revision: u64,
    configured: bool,
    scripted_conflicts: usize,
    concurrent_writes: VecDeque<Snapshot>,
    pulls: usize,
    pushes: usize,
}

impl MemoryRemoteState {
    fn write(&mut self, snapshot: &Snapshot) -> SyncResult<String> {
        self.next_revision += 1;
        let revision = format!("rev-{}", self.next_revision);
        self.document = Some(MemoryDocument {
            bytes: snapshot::encode(snapshot)?,
            revision: revision.clone(),
        });
        Ok(revision)
    }
}

/// Remote document held in memory with `rev-N` version tokens
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<MemoryRemoteState>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(MemoryRemoteState {
                document: None,
                next_revision: 0,
                configured: true,
                scripted_conflicts: 0,
                concurrent_writes: VecDeque::new(),
                pulls: 0,
                pushes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the document as another device would; returns the new token
    pub fn set_snapshot(&self, snapshot: &Snapshot) -> SyncResult<String> {
        self.lock().write(snapshot)
    }

    /// Store raw bytes without validation; returns the new token
    pub fn set_raw(&self, bytes: impl Into<Vec<u8>>) -> String {
        let mut state = self.lock();
        state.next_revision += 1;
        let revision = format!("rev-{}", state.next_revision);
        state.document = Some(MemoryDocument {
            bytes: bytes.into(),
            revision: revision.clone(),
        });
        revision
    }

    /// Current document, decoded
    pub fn snapshot(&self) -> SyncResult<Option<Snapshot>> {
        self.lock()
            .document
            .as_ref()
            .map(|document| snapshot::decode(&document.bytes).map_err(SyncError::from))
            .transpose()
    }

    #[must_use]
    pub fn version_token(&self) -> Option<String> {
        self.lock()
            .document
            .as_ref()
            .map(|document| document.revision.clone())
    }

    pub fn set_configured(&self, configured: bool) {
        self.lock().configured = configured;
    }

    /// Make the next `count` pushes fail with a conflict without writing
    pub fn fail_next_pushes_with_conflict(&self, count: usize) {
        self.lock().scripted_conflicts = count;
    }

    /// Land a write from another device just before the next push
    pub fn inject_concurrent_write(&self, snapshot: Snapshot) {
        self.lock().concurrent_writes.push_back(snapshot);
    }

    #[must_use]
    pub fn pull_count(&self) -> usize {
        self.lock().pulls
    }

    /// Push attempts, including rejected ones
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.lock().pushes
    }
}

impl RemoteSyncPort for MemoryRemote {
    fn is_configured(&self) -> bool {
        self.lock().configured
    }

    async fn test_connection(&self) -> SyncResult<String> {
        Ok("memory".to_string())
    }

    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>> {
        let mut state = self.lock();
        state.pulls += 1;
        let Some(document) = state.document.as_ref() else {
            return Ok(None);
        };
        Ok(Some(PulledSnapshot {
            snapshot: snapshot::decode(&document.bytes)?,
            version_token: document.revision.clone(),
        }))
    }

    async fn push(
        &self,
        snapshot: &Snapshot,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        let mut state = self.lock();
        state.pushes += 1;

        if let Some(concurrent) = state.concurrent_writes.pop_front() {
            state.write(&concurrent)?;
        }
        if state.scripted_conflicts > 0 {
            state.scripted_conflicts -= 1;
            return Err(SyncError::Conflict);
        }
        if let Some(expected) = expected_version {
            let current = state.document.as_ref().map(|document| document.revision.as_str());
            if current != Some(expected) {
                return Err(SyncError::Conflict);
            }
        }

        state.write(snapshot)
    }
}
