use std::path::Path;

use cadence_core::db::{CatalogRepository, LibSqlCatalogRepository};
use cadence_core::util::now_ms;
use cadence_core::{RecordKind, Setlist};
use serde::Serialize;

use crate::cli::SetlistCommands;
use crate::commands::common::{format_relative_time, normalize_required, open_database, short_id};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SetlistListItem {
    pub id: String,
    pub name: String,
    pub song_ids: Vec<String>,
    pub updated_at: i64,
    pub relative_time: String,
}

pub async fn run_setlist(command: SetlistCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SetlistCommands::Add { name, songs } => run_add(&name, &songs, db_path).await,
        SetlistCommands::List { json } => run_list(json, db_path).await,
        SetlistCommands::Delete { id } => run_delete(&id, db_path).await,
    }
}

async fn run_add(name: &str, songs: &[String], db_path: &Path) -> Result<(), CliError> {
    let name = normalize_required(name, "Setlist name")?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCatalogRepository::new(db.connection());

    let mut setlist = Setlist::new(name);
    for song in songs {
        let query = normalize_required(song, "Song ID")?;
        setlist
            .song_ids
            .push(repo.resolve_id(RecordKind::Song, &query).await?);
    }

    repo.create_setlist(&setlist).await?;
    println!("{}", setlist.id);
    Ok(())
}

pub fn format_setlist_lines(setlists: &[Setlist], now_ms: i64) -> Vec<String> {
    setlists
        .iter()
        .map(|setlist| {
            let songs = match setlist.song_ids.len() {
                1 => "1 song".to_string(),
                count => format!("{count} songs"),
            };
            let relative_time = format_relative_time(setlist.updated_at, now_ms);
            format!(
                "{:<13}  {:<32}  {songs:<10}  {relative_time}",
                short_id(&setlist.id),
                setlist.name
            )
        })
        .collect()
}

async fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let setlists = LibSqlCatalogRepository::new(db.connection())
        .list_setlists()
        .await?;
    let now = now_ms();

    if as_json {
        let items = setlists
            .iter()
            .map(|setlist| SetlistListItem {
                id: setlist.id.clone(),
                name: setlist.name.clone(),
                song_ids: setlist.song_ids.clone(),
                updated_at: setlist.updated_at,
                relative_time: format_relative_time(setlist.updated_at, now),
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if setlists.is_empty() {
        println!("No setlists yet.");
    } else {
        for line in format_setlist_lines(&setlists, now) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let query = normalize_required(id, "Setlist ID")?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCatalogRepository::new(db.connection());
    let resolved = repo.resolve_id(RecordKind::Setlist, &query).await?;

    repo.delete_setlist(&resolved).await?;
    println!("{resolved}");
    Ok(())
}
