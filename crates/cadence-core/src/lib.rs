//! cadence-core - Core library for Cadence
//!
//! Songs and setlists catalog with snapshot-based synchronization against a
//! single shared JSON document on GitHub, Dropbox or the local filesystem.
//! The CLI is a thin layer over this crate.

pub mod db;
pub mod error;
pub mod models;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod tombstone;
pub mod util;

pub use error::{Error, Result};
pub use models::{RecordKind, Setlist, Song, SyncRecord};
pub use snapshot::Snapshot;
pub use tombstone::Tombstone;
