//! Song and setlist repository implementation

use crate::error::{Error, Result};
use crate::models::{RecordKind, Setlist, Song};
use crate::tombstone::Tombstone;
use crate::util::now_ms;
use libsql::{params::Params, Connection, Value};

use super::connection::{execute_atomic, Statement};

pub(crate) const UPSERT_TOMBSTONE: &str = "INSERT INTO tombstones (kind, id, deleted_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(kind, id) DO UPDATE SET deleted_at = MAX(deleted_at, excluded.deleted_at)";

pub(crate) const INSERT_SONG: &str =
    "INSERT OR REPLACE INTO songs (id, title, updated_at, data) VALUES (?1, ?2, ?3, ?4)";

pub(crate) const INSERT_SETLIST: &str =
    "INSERT OR REPLACE INTO setlists (id, name, updated_at, data) VALUES (?1, ?2, ?3, ?4)";

/// Trait for catalog storage operations (async)
///
/// Every mutation bumps `updated_at`; deletions leave a tombstone.
#[allow(async_fn_in_trait)]
pub trait CatalogRepository {
    /// Insert a new song
    async fn create_song(&self, song: &Song) -> Result<()>;

    async fn get_song(&self, id: &str) -> Result<Option<Song>>;

    /// All songs, ordered by title
    async fn list_songs(&self) -> Result<Vec<Song>>;

    /// Persist an edited song, bumping its `updated_at`
    async fn update_song(&self, song: Song) -> Result<Song>;

    /// Delete a song, record its tombstone and strip it from every setlist
    async fn delete_song(&self, id: &str) -> Result<Tombstone>;

    /// Insert a new setlist
    async fn create_setlist(&self, setlist: &Setlist) -> Result<()>;

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>>;

    /// All setlists, ordered by name
    async fn list_setlists(&self) -> Result<Vec<Setlist>>;

    /// Persist an edited setlist, bumping its `updated_at`
    async fn update_setlist(&self, setlist: Setlist) -> Result<Setlist>;

    /// Delete a setlist and record its tombstone
    async fn delete_setlist(&self, id: &str) -> Result<Tombstone>;

    /// Resolve a full id from a unique prefix
    async fn resolve_id(&self, kind: RecordKind, prefix: &str) -> Result<String>;
}

/// libSQL implementation of `CatalogRepository`
pub struct LibSqlCatalogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCatalogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_records<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: Params,
    ) -> Result<Vec<T>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            records.push(serde_json::from_str(&data)?);
        }
        Ok(records)
    }

    async fn write(&self, statement: Statement) -> Result<u64> {
        let (sql, params) = statement;
        Ok(self.conn.execute(sql, Params::Positional(params)).await?)
    }
}

pub(crate) fn song_statement(song: &Song) -> Result<Statement> {
    Ok((
        INSERT_SONG,
        vec![
            Value::from(song.id.clone()),
            Value::from(song.title.clone()),
            Value::Integer(song.updated_at),
            Value::from(serde_json::to_string(song)?),
        ],
    ))
}

pub(crate) fn setlist_statement(setlist: &Setlist) -> Result<Statement> {
    Ok((
        INSERT_SETLIST,
        vec![
            Value::from(setlist.id.clone()),
            Value::from(setlist.name.clone()),
            Value::Integer(setlist.updated_at),
            Value::from(serde_json::to_string(setlist)?),
        ],
    ))
}

pub(crate) fn tombstone_statement(tombstone: &Tombstone) -> Statement {
    (
        UPSERT_TOMBSTONE,
        vec![
            Value::from(tombstone.kind.as_str()),
            Value::from(tombstone.id.clone()),
            Value::Integer(tombstone.deleted_at),
        ],
    )
}

fn validate_song(song: &Song) -> Result<()> {
    if song.title.trim().is_empty() {
        return Err(Error::InvalidInput("song title cannot be empty".into()));
    }
    Ok(())
}

fn validate_setlist(setlist: &Setlist) -> Result<()> {
    if setlist.name.trim().is_empty() {
        return Err(Error::InvalidInput("setlist name cannot be empty".into()));
    }
    Ok(())
}

impl CatalogRepository for LibSqlCatalogRepository<'_> {
    async fn create_song(&self, song: &Song) -> Result<()> {
        validate_song(song)?;
        if self.get_song(&song.id).await?.is_some() {
            return Err(Error::InvalidInput(format!("song {} already exists", song.id)));
        }
        self.write(song_statement(song)?).await?;
        Ok(())
    }

    async fn get_song(&self, id: &str) -> Result<Option<Song>> {
        let songs = self
            .query_records(
                "SELECT data FROM songs WHERE id = ?1",
                Params::Positional(vec![Value::from(id)]),
            )
            .await?;
        Ok(songs.into_iter().next())
    }

    async fn list_songs(&self) -> Result<Vec<Song>> {
        self.query_records(
            "SELECT data FROM songs ORDER BY title COLLATE NOCASE, id",
            Params::None,
        )
        .await
    }

    async fn update_song(&self, mut song: Song) -> Result<Song> {
        validate_song(&song)?;
        if self.get_song(&song.id).await?.is_none() {
            return Err(Error::NotFound(song.id));
        }
        song.touch(now_ms());
        self.write(song_statement(&song)?).await?;
        Ok(song)
    }

    async fn delete_song(&self, id: &str) -> Result<Tombstone> {
        let song = self
            .get_song(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let now = now_ms();
        let tombstone = Tombstone::new(RecordKind::Song, id, now.max(song.updated_at));

        let mut statements = vec![
            (
                "DELETE FROM songs WHERE id = ?1",
                vec![Value::from(id)],
            ),
            tombstone_statement(&tombstone),
        ];
        for mut setlist in self.list_setlists().await? {
            if setlist.remove_song(id) {
                setlist.touch(now);
                statements.push(setlist_statement(&setlist)?);
            }
        }

        execute_atomic(self.conn, statements).await?;
        tracing::debug!(song_id = id, "Deleted song");
        Ok(tombstone)
    }

    async fn create_setlist(&self, setlist: &Setlist) -> Result<()> {
        validate_setlist(setlist)?;
        if self.get_setlist(&setlist.id).await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "setlist {} already exists",
                setlist.id
            )));
        }
        self.write(setlist_statement(setlist)?).await?;
        Ok(())
    }

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>> {
        let setlists = self
            .query_records(
                "SELECT data FROM setlists WHERE id = ?1",
                Params::Positional(vec![Value::from(id)]),
            )
            .await?;
        Ok(setlists.into_iter().next())
    }

    async fn list_setlists(&self) -> Result<Vec<Setlist>> {
        self.query_records(
            "SELECT data FROM setlists ORDER BY name COLLATE NOCASE, id",
            Params::None,
        )
        .await
    }

    async fn update_setlist(&self, mut setlist: Setlist) -> Result<Setlist> {
        validate_setlist(&setlist)?;
        if self.get_setlist(&setlist.id).await?.is_none() {
            return Err(Error::NotFound(setlist.id));
        }
        setlist.touch(now_ms());
        self.write(setlist_statement(&setlist)?).await?;
        Ok(setlist)
    }

    async fn delete_setlist(&self, id: &str) -> Result<Tombstone> {
        let setlist = self
            .get_setlist(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let tombstone = Tombstone::new(RecordKind::Setlist, id, now_ms().max(setlist.updated_at));
        execute_atomic(
            self.conn,
            vec![
                (
                    "DELETE FROM setlists WHERE id = ?1",
                    vec![Value::from(id)],
                ),
                tombstone_statement(&tombstone),
            ],
        )
        .await?;
        tracing::debug!(setlist_id = id, "Deleted setlist");
        Ok(tombstone)
    }

    async fn resolve_id(&self, kind: RecordKind, prefix: &str) -> Result<String> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::InvalidInput(format!("{kind} id cannot be empty")));
        }

        let sql = match kind {
            RecordKind::Song => {
                "SELECT id FROM songs WHERE id LIKE ?2 ESCAPE '\\' ORDER BY id = ?1 DESC, id LIMIT 2"
            }
            RecordKind::Setlist => {
                "SELECT id FROM setlists WHERE id LIKE ?2 ESCAPE '\\' ORDER BY id = ?1 DESC, id LIMIT 2"
            }
        };
        let pattern = format!(
            "{}%",
            prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );

        let mut rows = self
            .conn
            .query(
                sql,
                Params::Positional(vec![Value::from(prefix), Value::from(pattern)]),
            )
            .await?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next().await? {
            matches.push(row.get::<String>(0)?);
        }

        if matches.iter().any(|id| id == prefix) {
            return Ok(prefix.to_string());
        }
        match matches.len() {
            0 => Err(Error::NotFound(format!("{kind} {prefix}"))),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::InvalidInput(format!(
                "{kind} id prefix '{prefix}' is ambiguous"
            ))),
        }
    }
}
