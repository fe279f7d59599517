use std::path::{Path, PathBuf};

use cadence_core::db::{CatalogRepository, LibSqlCatalogRepository};
use cadence_core::util::{normalize_text_option, now_ms};
use cadence_core::{RecordKind, Song};
use serde::Serialize;

use crate::cli::SongCommands;
use crate::commands::common::{
    format_relative_time, normalize_required, open_database, read_content_file, short_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SongListItem {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub key: Option<String>,
    pub tempo: Option<u32>,
    pub tags: Vec<String>,
    pub updated_at: i64,
    pub relative_time: String,
}

/// Field changes requested by `song edit`
#[derive(Debug, Default)]
pub struct SongEdit {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub key: Option<String>,
    pub tempo: Option<u32>,
    pub content: Option<String>,
}

impl SongEdit {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.key.is_none()
            && self.tempo.is_none()
            && self.content.is_none()
    }

    /// Apply to `song`; returns whether anything changed
    pub fn apply(self, song: &mut Song) -> Result<bool, CliError> {
        let before = song.clone();
        if let Some(title) = self.title {
            song.title = normalize_required(&title, "Song title")?;
        }
        if let Some(artist) = self.artist {
            song.artist = normalize_text_option(Some(artist));
        }
        if let Some(key) = self.key {
            song.key = normalize_text_option(Some(key));
        }
        if let Some(tempo) = self.tempo {
            song.tempo = Some(tempo);
        }
        if let Some(content) = self.content {
            song.content = content;
        }
        Ok(*song != before)
    }
}

pub async fn run_song(command: SongCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SongCommands::Add {
            title,
            artist,
            key,
            tempo,
            tags,
            content_file,
        } => run_add(&title, artist, key, tempo, tags, content_file, db_path).await,
        SongCommands::List { json } => run_list(json, db_path).await,
        SongCommands::Edit {
            id,
            title,
            artist,
            key,
            tempo,
            content_file,
        } => {
            let content = content_file
                .as_deref()
                .map(read_content_file)
                .transpose()?;
            let edit = SongEdit {
                title,
                artist,
                key,
                tempo,
                content,
            };
            run_edit(&id, edit, db_path).await
        }
        SongCommands::Delete { id } => run_delete(&id, db_path).await,
    }
}

pub fn build_song(
    title: &str,
    artist: Option<String>,
    key: Option<String>,
    tempo: Option<u32>,
    tags: Vec<String>,
    content: Option<String>,
) -> Result<Song, CliError> {
    let mut song = Song::new(normalize_required(title, "Song title")?);
    song.artist = normalize_text_option(artist);
    song.key = normalize_text_option(key);
    song.tempo = tempo;
    song.tags = tags
        .into_iter()
        .filter_map(|tag| normalize_text_option(Some(tag)))
        .collect();
    song.content = content.unwrap_or_default();
    Ok(song)
}

async fn run_add(
    title: &str,
    artist: Option<String>,
    key: Option<String>,
    tempo: Option<u32>,
    tags: Vec<String>,
    content_file: Option<PathBuf>,
    db_path: &Path,
) -> Result<(), CliError> {
    let content = content_file
        .as_deref()
        .map(read_content_file)
        .transpose()?;
    let song = build_song(title, artist, key, tempo, tags, content)?;

    let db = open_database(db_path).await?;
    LibSqlCatalogRepository::new(db.connection())
        .create_song(&song)
        .await?;
    println!("{}", song.id);
    Ok(())
}

pub fn song_to_list_item(song: &Song, now_ms: i64) -> SongListItem {
    SongListItem {
        id: song.id.clone(),
        title: song.title.clone(),
        artist: song.artist.clone(),
        key: song.key.clone(),
        tempo: song.tempo,
        tags: song.tags.clone(),
        updated_at: song.updated_at,
        relative_time: format_relative_time(song.updated_at, now_ms),
    }
}

pub fn format_song_lines(songs: &[Song], now_ms: i64) -> Vec<String> {
    songs
        .iter()
        .map(|song| {
            let details = [song.artist.as_deref(), song.key.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ");
            let relative_time = format_relative_time(song.updated_at, now_ms);
            format!(
                "{:<13}  {:<32}  {:<24}  {relative_time}",
                short_id(&song.id),
                song.title,
                details
            )
        })
        .collect()
}

async fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let songs = LibSqlCatalogRepository::new(db.connection())
        .list_songs()
        .await?;
    let now = now_ms();

    if as_json {
        let items = songs
            .iter()
            .map(|song| song_to_list_item(song, now))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if songs.is_empty() {
        println!("No songs yet.");
    } else {
        for line in format_song_lines(&songs, now) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_edit(id: &str, edit: SongEdit, db_path: &Path) -> Result<(), CliError> {
    if edit.is_empty() {
        return Err(CliError::NothingToUpdate);
    }
    let query = normalize_required(id, "Song ID")?;

    let db = open_database(db_path).await?;
    let repo = LibSqlCatalogRepository::new(db.connection());
    let resolved = repo.resolve_id(RecordKind::Song, &query).await?;
    let mut song = repo
        .get_song(&resolved)
        .await?
        .ok_or_else(|| cadence_core::Error::NotFound(resolved.clone()))?;

    if edit.apply(&mut song)? {
        repo.update_song(song).await?;
    }
    println!("{resolved}");
    Ok(())
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let query = normalize_required(id, "Song ID")?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCatalogRepository::new(db.connection());
    let resolved = repo.resolve_id(RecordKind::Song, &query).await?;

    repo.delete_song(&resolved).await?;
    println!("{resolved}");
    Ok(())
}
