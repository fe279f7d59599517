//! Database layer for Cadence

mod catalog;
mod connection;
mod migrations;
mod store;

pub use catalog::{CatalogRepository, LibSqlCatalogRepository};
pub use connection::Database;
