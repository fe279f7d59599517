//! Profile store traits backed by libSQL

use libsql::{params::Params, Value};

use crate::error::{Error, Result};
use crate::models::RecordKind;
use crate::snapshot::{self, Snapshot};
use crate::store::{BaselineStore, LocalStore, SyncConfigStore, TombstoneStore};
use crate::sync::config::{RemoteKind, SyncConfig};
use crate::tombstone::{union_tombstones, Tombstone, TOMBSTONE_RETENTION_MS};
use crate::util::now_ms;

use super::catalog::{
    setlist_statement, song_statement, tombstone_statement, CatalogRepository,
    LibSqlCatalogRepository,
};
use super::connection::{execute_atomic, Database, Statement};

impl Database {
    fn catalog(&self) -> LibSqlCatalogRepository<'_> {
        LibSqlCatalogRepository::new(self.connection())
    }

    async fn load_json(&self, sql: &str, key: &str) -> Result<Option<String>> {
        let mut rows = self.connection().query(sql, [key]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }
}

/// Statements that replace every song and setlist with the snapshot's
fn record_statements(snapshot: &Snapshot) -> Result<Vec<Statement>> {
    let mut statements = vec![
        ("DELETE FROM songs", Vec::new()),
        ("DELETE FROM setlists", Vec::new()),
    ];
    for song in &snapshot.songs {
        statements.push(song_statement(song)?);
    }
    for setlist in &snapshot.setlists {
        statements.push(setlist_statement(setlist)?);
    }
    Ok(statements)
}

impl LocalStore for Database {
    async fn export_all(&self) -> Result<Snapshot> {
        let catalog = self.catalog();
        let songs = catalog.list_songs().await?;
        let setlists = catalog.list_setlists().await?;
        let tombstones = self.list_tombstones().await?;
        Ok(Snapshot::new(now_ms(), songs, setlists, tombstones))
    }

    async fn import_all(&self, snapshot: &Snapshot) -> Result<()> {
        execute_atomic(self.connection(), record_statements(snapshot)?).await?;
        tracing::debug!(
            songs = snapshot.songs.len(),
            setlists = snapshot.setlists.len(),
            "Imported snapshot into local store"
        );
        Ok(())
    }

    async fn import_with_tombstones(&self, snapshot: &Snapshot) -> Result<()> {
        let mut statements = record_statements(snapshot)?;
        statements.push(("DELETE FROM tombstones", Vec::new()));
        statements.extend(
            union_tombstones(&[snapshot.tombstones.as_slice()])
                .iter()
                .map(tombstone_statement),
        );

        execute_atomic(self.connection(), statements).await?;
        tracing::debug!(
            songs = snapshot.songs.len(),
            setlists = snapshot.setlists.len(),
            tombstones = snapshot.tombstones.len(),
            "Imported snapshot and tombstones into local store"
        );
        Ok(())
    }

    async fn count_records(&self, kind: RecordKind) -> Result<usize> {
        let sql = match kind {
            RecordKind::Song => "SELECT COUNT(*) FROM songs",
            RecordKind::Setlist => "SELECT COUNT(*) FROM setlists",
        };
        let mut rows = self.connection().query(sql, ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        usize::try_from(count).map_err(|_| Error::Database(format!("invalid row count {count}")))
    }
}

impl TombstoneStore for Database {
    async fn list_tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut rows = self
            .connection()
            .query("SELECT kind, id, deleted_at FROM tombstones", ())
            .await?;

        let mut tombstones = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(0)?;
            let kind = kind.parse::<RecordKind>().map_err(Error::Database)?;
            tombstones.push(Tombstone::new(kind, row.get::<String>(1)?, row.get(2)?));
        }
        Ok(union_tombstones(&[tombstones.as_slice()]))
    }

    async fn record_tombstone(&self, tombstone: &Tombstone) -> Result<()> {
        let (sql, params) = tombstone_statement(tombstone);
        self.connection()
            .execute(sql, Params::Positional(params))
            .await?;
        Ok(())
    }

    async fn replace_tombstones(&self, tombstones: &[Tombstone]) -> Result<()> {
        let mut statements = vec![("DELETE FROM tombstones", Vec::new())];
        statements.extend(tombstones.iter().map(tombstone_statement));
        execute_atomic(self.connection(), statements).await
    }

    async fn prune_tombstones(&self, now_ms: i64) -> Result<usize> {
        let removed = self
            .connection()
            .execute(
                "DELETE FROM tombstones WHERE deleted_at < ?1",
                Params::Positional(vec![Value::Integer(now_ms - TOMBSTONE_RETENTION_MS)]),
            )
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired tombstones");
        }
        usize::try_from(removed).map_err(|_| Error::Database(format!("invalid row count {removed}")))
    }
}

impl SyncConfigStore for Database {
    async fn load_sync_config(&self, kind: RemoteKind) -> Result<Option<SyncConfig>> {
        self.load_json(
            "SELECT data FROM sync_configs WHERE adapter = ?1",
            kind.as_str(),
        )
        .await?
        .map(|data| serde_json::from_str(&data).map_err(Error::from))
        .transpose()
    }

    async fn list_sync_configs(&self) -> Result<Vec<SyncConfig>> {
        let mut rows = self
            .connection()
            .query("SELECT data FROM sync_configs ORDER BY adapter", ())
            .await?;

        let mut configs = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            configs.push(serde_json::from_str(&data)?);
        }
        Ok(configs)
    }

    async fn save_sync_config(&self, config: &SyncConfig) -> Result<()> {
        let data = serde_json::to_string(config)?;
        self.connection()
            .execute(
                "INSERT OR REPLACE INTO sync_configs (adapter, data, updated_at) VALUES (?1, ?2, ?3)",
                Params::Positional(vec![
                    Value::from(config.kind().as_str()),
                    Value::from(data),
                    Value::Integer(now_ms()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn delete_sync_config(&self, kind: RemoteKind) -> Result<bool> {
        let existed = self.load_sync_config(kind).await?.is_some();
        execute_atomic(
            self.connection(),
            vec![
                (
                    "DELETE FROM sync_configs WHERE adapter = ?1",
                    vec![Value::from(kind.as_str())],
                ),
                (
                    "DELETE FROM sync_baselines WHERE adapter = ?1",
                    vec![Value::from(kind.as_str())],
                ),
            ],
        )
        .await?;
        Ok(existed)
    }
}

impl BaselineStore for Database {
    async fn load_baseline(&self, kind: RemoteKind) -> Result<Option<Snapshot>> {
        let Some(data) = self
            .load_json(
                "SELECT data FROM sync_baselines WHERE adapter = ?1",
                kind.as_str(),
            )
            .await?
        else {
            return Ok(None);
        };

        match snapshot::decode(data.as_bytes()) {
            Ok(baseline) => Ok(Some(baseline)),
            Err(error) => {
                // A corrupt baseline only costs a full diff; drop it.
                tracing::warn!(adapter = %kind, %error, "Discarding unreadable sync baseline");
                self.clear_baseline(kind).await?;
                Ok(None)
            }
        }
    }

    async fn save_baseline(&self, kind: RemoteKind, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;
        self.connection()
            .execute(
                "INSERT OR REPLACE INTO sync_baselines (adapter, data, saved_at) VALUES (?1, ?2, ?3)",
                Params::Positional(vec![
                    Value::from(kind.as_str()),
                    Value::from(data),
                    Value::Integer(now_ms()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn clear_baseline(&self, kind: RemoteKind) -> Result<()> {
        self.connection()
            .execute(
                "DELETE FROM sync_baselines WHERE adapter = ?1",
                [kind.as_str()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Setlist, Song};
    use crate::sync::config::{GitHubConfig, RemoteConfig};
    use pretty_assertions::assert_eq;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn sample_snapshot() -> Snapshot {
        let mut song = Song::new("Jolene");
        song.id = "s1".into();
        song.extra.insert("capo".into(), serde_json::json!(4));
        let mut setlist = Setlist::new("Friday");
        setlist.id = "l1".into();
        setlist.song_ids = vec!["s1".into()];
        Snapshot::new(1, vec![song], vec![setlist], Vec::new())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_import_then_export_preserves_records() {
        let db = setup().await;
        let snapshot = sample_snapshot();

        db.import_all(&snapshot).await.unwrap();
        let exported = db.export_all().await.unwrap();

        assert!(exported.same_content(&snapshot));
        assert_eq!(db.count_records(RecordKind::Song).await.unwrap(), 1);
        assert_eq!(db.count_records(RecordKind::Setlist).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_import_replaces_existing_records() {
        let db = setup().await;
        db.import_all(&sample_snapshot()).await.unwrap();
        db.import_all(&Snapshot::empty(2)).await.unwrap();

        assert_eq!(db.count_records(RecordKind::Song).await.unwrap(), 0);
        assert_eq!(db.count_records(RecordKind::Setlist).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_import_with_tombstones_replaces_both() {
        let db = setup().await;
        db.record_tombstone(&Tombstone::new(RecordKind::Song, "stale", 3))
            .await
            .unwrap();

        let mut snapshot = sample_snapshot();
        snapshot.tombstones = vec![Tombstone::new(RecordKind::Song, "fresh", 7)];
        db.import_with_tombstones(&snapshot).await.unwrap();

        let exported = db.export_all().await.unwrap();
        assert!(exported.same_content(&snapshot));
        assert_eq!(
            exported.tombstones,
            vec![Tombstone::new(RecordKind::Song, "fresh", 7)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_export_includes_tombstones() {
        let db = setup().await;
        db.record_tombstone(&Tombstone::new(RecordKind::Setlist, "gone", 9))
            .await
            .unwrap();

        let exported = db.export_all().await.unwrap();
        assert_eq!(
            exported.tombstones,
            vec![Tombstone::new(RecordKind::Setlist, "gone", 9)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_tombstone_keeps_latest() {
        let db = setup().await;
        db.record_tombstone(&Tombstone::new(RecordKind::Song, "x", 20))
            .await
            .unwrap();
        db.record_tombstone(&Tombstone::new(RecordKind::Song, "x", 10))
            .await
            .unwrap();

        assert_eq!(
            db.list_tombstones().await.unwrap(),
            vec![Tombstone::new(RecordKind::Song, "x", 20)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prune_and_replace_tombstones() {
        let db = setup().await;
        let now = 100 * DAY_MS;
        db.replace_tombstones(&[
            Tombstone::new(RecordKind::Song, "old", now - 40 * DAY_MS),
            Tombstone::new(RecordKind::Song, "new", now - DAY_MS),
        ])
        .await
        .unwrap();

        assert_eq!(db.prune_tombstones(now).await.unwrap(), 1);
        let remaining = db.list_tombstones().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_config_round_trip() {
        let db = setup().await;
        let mut config = SyncConfig::new(RemoteConfig::GitHub(GitHubConfig {
            owner: "octo".into(),
            repo: "songs".into(),
            path: "cadence.json".into(),
            branch: Some("main".into()),
            token: Some("ghp_x".into()),
            api_base_url: None,
        }));

        assert!(db.load_sync_config(RemoteKind::GitHub).await.unwrap().is_none());
        db.save_sync_config(&config).await.unwrap();

        config.record_sync("sha-1", 55);
        db.save_sync_config(&config).await.unwrap();

        let loaded = db.load_sync_config(RemoteKind::GitHub).await.unwrap();
        assert_eq!(loaded, Some(config));
        assert_eq!(db.list_sync_configs().await.unwrap().len(), 1);

        assert!(db.delete_sync_config(RemoteKind::GitHub).await.unwrap());
        assert!(!db.delete_sync_config(RemoteKind::GitHub).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_baseline_round_trip_and_clear() {
        let db = setup().await;
        let snapshot = sample_snapshot();

        db.save_baseline(RemoteKind::Dropbox, &snapshot).await.unwrap();
        assert_eq!(
            db.load_baseline(RemoteKind::Dropbox).await.unwrap(),
            Some(snapshot)
        );
        assert!(db.load_baseline(RemoteKind::GitHub).await.unwrap().is_none());

        db.clear_baseline(RemoteKind::Dropbox).await.unwrap();
        assert!(db.load_baseline(RemoteKind::Dropbox).await.unwrap().is_none());
    }
}
