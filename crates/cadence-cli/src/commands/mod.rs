pub mod common;
pub mod completions;
pub mod config;
pub mod remote;
pub mod setlist;
pub mod song;
pub mod sync;
pub mod tombstones;
pub mod transfer;
