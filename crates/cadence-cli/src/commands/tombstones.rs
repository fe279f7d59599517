use std::path::Path;

use cadence_core::store::TombstoneStore;
use cadence_core::tombstone::TOMBSTONE_RETENTION_MS;
use cadence_core::util::now_ms;
use cadence_core::Tombstone;

use crate::cli::TombstoneCommands;
use crate::commands::common::{format_sync_timestamp, open_database};
use crate::error::CliError;

pub async fn run_tombstones(command: TombstoneCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        TombstoneCommands::List { json } => run_list(json, db_path).await,
        TombstoneCommands::Prune => run_prune(db_path).await,
    }
}

pub fn format_tombstone_lines(tombstones: &[Tombstone], now_ms: i64) -> Vec<String> {
    tombstones
        .iter()
        .map(|tombstone| {
            let days_left = (tombstone.deleted_at + TOMBSTONE_RETENTION_MS - now_ms)
                .max(0)
                / (24 * 60 * 60 * 1000);
            format!(
                "{:<7}  {}  deleted {}  ({days_left}d left)",
                tombstone.kind.as_str(),
                tombstone.id,
                format_sync_timestamp(tombstone.deleted_at)
            )
        })
        .collect()
}

async fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let tombstones = db.list_tombstones().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tombstones)?);
    } else if tombstones.is_empty() {
        println!("No tombstones.");
    } else {
        for line in format_tombstone_lines(&tombstones, now_ms()) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_prune(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let pruned = db.prune_tombstones(now_ms()).await?;
    println!("Pruned {pruned} expired tombstones");
    Ok(())
}
