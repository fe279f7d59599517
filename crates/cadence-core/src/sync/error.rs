//! Error taxonomy for the sync engine.
//!
//! Adapters normalize every host-specific failure into one of these variants
//! before it reaches the orchestrator.

use thiserror::Error;

use crate::snapshot::SchemaError;
use crate::sync::config::RemoteKind;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote or local document failed validation. Never retried.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The remote changed between pull and push.
    #[error("remote document changed since it was pulled")]
    Conflict,

    /// The host answered with a non-success status.
    #[error("remote error: {message} ({status})")]
    Remote { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The adapter is missing required connection fields.
    #[error("{0} remote is not configured")]
    NotConfigured(RemoteKind),

    /// Adapter-side failure that is neither HTTP nor schema related.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] crate::Error),

    /// Local filesystem failure (file remote).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Builds a host error from a status code and message.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Returns true for the concurrent-write signal the orchestrator retries.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
