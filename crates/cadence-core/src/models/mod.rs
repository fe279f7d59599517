//! Data models for Cadence

mod record;
mod setlist;
mod song;

pub use record::{new_record_id, RecordKind, SyncRecord};
pub use setlist::Setlist;
pub use song::Song;
