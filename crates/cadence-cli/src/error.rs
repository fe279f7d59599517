use std::io;

use cadence_core::sync::{RemoteKind, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cadence_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Nothing to update; pass at least one field")]
    NothingToUpdate,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No remote connected. Run `cadence remote connect github|dropbox|file ...` first.")]
    NoRemote,
    #[error("No {0} remote connected")]
    RemoteNotConnected(RemoteKind),
    #[error("Several remotes are connected ({0}); pass --remote")]
    AmbiguousRemote(String),
    #[error("Invalid selection '{0}': expected TYPE:ID with TYPE song or setlist")]
    InvalidSelection(String),
    #[error("Selection '{0}' matches several outgoing changes")]
    AmbiguousSelection(String),
    #[error("Selection '{0}' matches no outgoing change")]
    UnknownSelection(String),
}
