//! Snapshot document export and import.

use std::io::{self, Write};
use std::path::Path;

use cadence_core::db::Database;
use cadence_core::snapshot;
use cadence_core::store::{LocalStore, TombstoneStore};
use cadence_core::tombstone::{prune_tombstones, union_tombstones};
use cadence_core::util::now_ms;
use cadence_core::Snapshot;

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let document = snapshot::encode(&db.export_all().await?)?;

    if let Some(path) = output_path {
        std::fs::write(path, &document)?;
        println!("{}", path.display());
    } else {
        let mut stdout = io::stdout();
        stdout.write_all(&document)?;
        writeln!(stdout)?;
    }
    Ok(())
}

/// Replace local records with `incoming`.
///
/// Tombstones from the document are merged into the local set rather than
/// replacing it, so deletions made here are not forgotten.
pub async fn import_snapshot(db: &Database, incoming: &Snapshot) -> Result<(), CliError> {
    let existing = db.list_tombstones().await?;
    let tombstones = prune_tombstones(
        &union_tombstones(&[existing.as_slice(), incoming.tombstones.as_slice()]),
        now_ms(),
    );
    db.import_with_tombstones(&Snapshot {
        tombstones,
        ..incoming.clone()
    })
    .await?;
    Ok(())
}

pub async fn run_import(path: &Path, db_path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read(path)?;
    let incoming = snapshot::decode(&raw).map_err(cadence_core::sync::SyncError::from)?;

    let db = open_database(db_path).await?;
    import_snapshot(&db, &incoming).await?;
    println!(
        "Imported {} songs and {} setlists from {}",
        incoming.songs.len(),
        incoming.setlists.len(),
        path.display()
    );
    Ok(())
}
