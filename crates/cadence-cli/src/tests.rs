use std::path::PathBuf;

use cadence_core::db::{CatalogRepository, Database, LibSqlCatalogRepository};
use cadence_core::store::{LocalStore, MemoryStore, SyncConfigStore, TombstoneStore};
use cadence_core::sync::{
    ChangeItem, ChangeKind, DropboxConfig, GitHubConfig, LocalFileConfig, RemoteConfig,
    RemoteKind, SyncConfig,
};
use cadence_core::tombstone::TOMBSTONE_RETENTION_MS;
use cadence_core::{RecordKind, Snapshot, Song, Tombstone};
use clap::{CommandFactory, Parser};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, ConnectCommands, SyncCommands};
use crate::commands::common::{
    format_relative_time, format_sync_timestamp, normalize_required, select_sync_config, short_id,
    with_credentials, DROPBOX_APP_KEY_ENV, DROPBOX_REFRESH_TOKEN_ENV, GITHUB_TOKEN_ENV,
};
use crate::commands::completions::{completion_script, run_completions};
use crate::commands::config::init_profile;
use crate::commands::remote::remote_config_from_args;
use crate::commands::song::{build_song, SongEdit};
use crate::commands::sync::{load_status, select_items, Selection};
use crate::commands::tombstones::format_tombstone_lines;
use crate::commands::transfer::{import_snapshot, run_export, run_import};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

fn file_config(path: &str) -> SyncConfig {
    SyncConfig::new(RemoteConfig::File(LocalFileConfig {
        path: PathBuf::from(path),
    }))
}

fn change(kind: RecordKind, id: &str, change: ChangeKind) -> ChangeItem {
    ChangeItem {
        kind,
        id: id.to_string(),
        name: format!("{} {id}", kind.as_str()),
        change,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_review_accepts_remote_after_subcommand() {
    let cli = Cli::try_parse_from([
        "cadence",
        "sync",
        "review",
        "--remote",
        "github",
        "--select",
        "song:0192",
        "--select",
        "setlist:abc",
    ])
    .unwrap();

    let Commands::Sync { remote, command } = cli.command else {
        panic!("expected sync command");
    };
    assert_eq!(remote.map(RemoteKind::from), Some(RemoteKind::GitHub));
    let Some(SyncCommands::Review { select, all, none, .. }) = command else {
        panic!("expected review subcommand");
    };
    assert_eq!(select, vec!["song:0192".to_string(), "setlist:abc".to_string()]);
    assert!(!all);
    assert!(!none);
}

#[test]
fn sync_review_rejects_all_with_select() {
    let result = Cli::try_parse_from(["cadence", "sync", "review", "--all", "--select", "song:x"]);
    assert!(result.is_err());
}

#[test]
fn global_profile_and_db_path_parse_anywhere() {
    let cli = Cli::try_parse_from([
        "cadence",
        "song",
        "list",
        "--profile",
        "band",
        "--db-path",
        "/tmp/band.db",
    ])
    .unwrap();
    assert_eq!(cli.profile.as_deref(), Some("band"));
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/band.db")));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_sync_timestamp_renders_utc() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn short_id_keeps_a_usable_prefix() {
    assert_eq!(short_id("0192f0c4-7a3e-7d41-9c1b-5e2f3a4b5c6d"), "0192f0c4-7a3e");
    assert_eq!(short_id("abc"), "abc");
}

#[test]
fn normalize_required_rejects_blank() {
    assert_eq!(normalize_required("  Sunday  ", "Setlist name").unwrap(), "Sunday");
    assert!(matches!(
        normalize_required(" ", "Setlist name"),
        Err(CliError::EmptyValue("Setlist name"))
    ));
}

#[test]
fn select_items_resolves_unique_prefixes() {
    let outgoing = vec![
        change(RecordKind::Song, "abc-1", ChangeKind::Added),
        change(RecordKind::Song, "abd-2", ChangeKind::Modified),
        change(RecordKind::Setlist, "abc-9", ChangeKind::Deleted),
    ];

    let selected = select_items(
        &outgoing,
        &Selection::Items(vec!["song:abc".into(), "setlist:abc".into(), "song:abc-1".into()]),
    )
    .unwrap();
    assert_eq!(selected, vec![outgoing[0].clone(), outgoing[2].clone()]);
}

#[test]
fn select_items_reports_ambiguous_unknown_and_invalid() {
    let outgoing = vec![
        change(RecordKind::Song, "abc-1", ChangeKind::Added),
        change(RecordKind::Song, "abd-2", ChangeKind::Added),
    ];

    assert!(matches!(
        select_items(&outgoing, &Selection::Items(vec!["song:ab".into()])),
        Err(CliError::AmbiguousSelection(_))
    ));
    assert!(matches!(
        select_items(&outgoing, &Selection::Items(vec!["song:zzz".into()])),
        Err(CliError::UnknownSelection(_))
    ));
    assert!(matches!(
        select_items(&outgoing, &Selection::Items(vec!["tune:abc".into()])),
        Err(CliError::InvalidSelection(_))
    ));
    assert!(matches!(
        select_items(&outgoing, &Selection::Items(vec!["song:".into()])),
        Err(CliError::InvalidSelection(_))
    ));
}

#[test]
fn selection_flags_map_to_choices() {
    assert_eq!(Selection::from_flags(Vec::new(), true, false), Selection::All);
    assert_eq!(Selection::from_flags(Vec::new(), false, true), Selection::Nothing);
    assert_eq!(Selection::from_flags(Vec::new(), false, false), Selection::Undecided);

    let outgoing = vec![change(RecordKind::Song, "a", ChangeKind::Added)];
    assert_eq!(select_items(&outgoing, &Selection::All).unwrap(), outgoing);
    assert!(select_items(&outgoing, &Selection::Nothing).unwrap().is_empty());
}

#[test]
fn credentials_fill_gaps_from_lookup() {
    let lookup = |name: &str| match name {
        GITHUB_TOKEN_ENV => Some("env-token".to_string()),
        DROPBOX_APP_KEY_ENV => Some("env-key".to_string()),
        DROPBOX_REFRESH_TOKEN_ENV => Some(" ".to_string()),
        _ => None,
    };

    let github = RemoteConfig::GitHub(GitHubConfig {
        owner: "octo".into(),
        repo: "songs".into(),
        path: "cadence.json".into(),
        branch: None,
        token: None,
        api_base_url: None,
    });
    let RemoteConfig::GitHub(filled) = with_credentials(github, lookup) else {
        panic!("adapter kind changed");
    };
    assert_eq!(filled.token.as_deref(), Some("env-token"));

    let dropbox = RemoteConfig::Dropbox(DropboxConfig {
        path: "/cadence.json".into(),
        app_key: Some("stored-key".into()),
        refresh_token: None,
        api_base_url: None,
        content_base_url: None,
    });
    let RemoteConfig::Dropbox(filled) = with_credentials(dropbox, lookup) else {
        panic!("adapter kind changed");
    };
    assert_eq!(filled.app_key.as_deref(), Some("stored-key"));
    assert_eq!(filled.refresh_token, None);
}

#[tokio::test]
async fn select_sync_config_requires_single_or_explicit_remote() {
    let store = MemoryStore::new();
    assert!(matches!(
        select_sync_config(&store, None).await,
        Err(CliError::NoRemote)
    ));

    store.save_sync_config(&file_config("/tmp/a.json")).await.unwrap();
    assert_eq!(
        select_sync_config(&store, None).await.unwrap().kind(),
        RemoteKind::File
    );
    assert!(matches!(
        select_sync_config(&store, Some(RemoteKind::GitHub)).await,
        Err(CliError::RemoteNotConnected(RemoteKind::GitHub))
    ));

    store
        .save_sync_config(&SyncConfig::new(RemoteConfig::Dropbox(DropboxConfig {
            path: "/cadence.json".into(),
            app_key: None,
            refresh_token: None,
            api_base_url: None,
            content_base_url: None,
        })))
        .await
        .unwrap();
    assert!(matches!(
        select_sync_config(&store, None).await,
        Err(CliError::AmbiguousRemote(_))
    ));
    assert_eq!(
        select_sync_config(&store, Some(RemoteKind::Dropbox))
            .await
            .unwrap()
            .kind(),
        RemoteKind::Dropbox
    );
}

#[test]
fn connect_arguments_are_validated() {
    let relative = remote_config_from_args(ConnectCommands::Dropbox {
        path: "cadence.json".into(),
        app_key: None,
        refresh_token: None,
    });
    assert!(matches!(relative, Err(CliError::Config(_))));

    let bad_url = remote_config_from_args(ConnectCommands::Github {
        owner: "octo".into(),
        repo: "songs".into(),
        path: "cadence.json".into(),
        branch: None,
        token: None,
        api_url: Some("github.example.com".into()),
    });
    assert!(matches!(bad_url, Err(CliError::Config(_))));

    let config = remote_config_from_args(ConnectCommands::Github {
        owner: " octo ".into(),
        repo: "songs".into(),
        path: "docs/cadence.json".into(),
        branch: Some(" ".into()),
        token: Some("ghp_x".into()),
        api_url: None,
    })
    .unwrap();
    let RemoteConfig::GitHub(github) = config else {
        panic!("expected github config");
    };
    assert_eq!(github.owner, "octo");
    assert_eq!(github.branch, None);
}

#[test]
fn build_song_normalizes_fields() {
    let song = build_song(
        "  Amazing Grace ",
        Some(" John Newton ".into()),
        Some(" ".into()),
        Some(72),
        vec![" hymn ".into(), String::new()],
        None,
    )
    .unwrap();

    assert_eq!(song.title, "Amazing Grace");
    assert_eq!(song.artist.as_deref(), Some("John Newton"));
    assert_eq!(song.key, None);
    assert_eq!(song.tempo, Some(72));
    assert_eq!(song.tags, vec!["hymn".to_string()]);

    assert!(matches!(
        build_song(" ", None, None, None, Vec::new(), None),
        Err(CliError::EmptyValue(_))
    ));
}

#[test]
fn song_edit_reports_whether_anything_changed() {
    let mut song = Song::new("Be Still");
    song.key = Some("D".into());

    let unchanged = SongEdit {
        key: Some("D".into()),
        ..SongEdit::default()
    };
    assert!(!unchanged.apply(&mut song).unwrap());

    let changed = SongEdit {
        key: Some("Eb".into()),
        tempo: Some(68),
        ..SongEdit::default()
    };
    assert!(changed.apply(&mut song).unwrap());
    assert_eq!(song.key.as_deref(), Some("Eb"));
    assert_eq!(song.tempo, Some(68));

    assert!(SongEdit::default().is_empty());
}

#[test]
fn tombstone_lines_show_remaining_retention() {
    let now = 100 * 24 * 60 * 60 * 1000;
    let tombstones = vec![Tombstone::new(
        RecordKind::Song,
        "gone",
        now - TOMBSTONE_RETENTION_MS + 2 * 24 * 60 * 60 * 1000,
    )];

    let lines = format_tombstone_lines(&tombstones, now);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("song "));
    assert!(lines[0].contains("gone"));
    assert!(lines[0].ends_with("(2d left)"));
}

#[test]
fn init_profile_sets_db_path_and_activates() {
    let mut config = CliProfilesConfig::default();
    let name = init_profile(
        &mut config,
        Some("band"),
        Some(PathBuf::from("/srv/band.db")),
        false,
    )
    .unwrap();

    assert_eq!(name, "band");
    assert_eq!(config.active_profile.as_deref(), Some("band"));
    assert_eq!(
        config.profiles["band"].db_path,
        Some(PathBuf::from("/srv/band.db"))
    );

    init_profile(&mut config, Some("solo"), None, true).unwrap();
    assert_eq!(config.active_profile.as_deref(), Some("band"));
    assert!(config.profiles.contains_key("solo"));
}

#[test]
fn completions_are_written_for_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.bash");

    run_completions(CompletionShell::Bash, Some(path.as_path())).unwrap();
    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("cadence"));
}

#[test]
fn completion_scripts_use_the_command_name() {
    let zsh = String::from_utf8(completion_script(CompletionShell::Zsh)).unwrap();
    assert!(zsh.starts_with("#compdef cadence"));

    let fish = String::from_utf8(completion_script(CompletionShell::Fish)).unwrap();
    assert!(fish.contains("complete -c cadence"));
}

#[tokio::test(flavor = "multi_thread")]
async fn import_merges_tombstones_with_local_ones() {
    let db = Database::open_in_memory().await.unwrap();
    let now = cadence_core::util::now_ms();
    db.record_tombstone(&Tombstone::new(RecordKind::Song, "local-delete", now))
        .await
        .unwrap();

    let mut song = Song::new("Imported");
    song.id = "imported".into();
    let incoming = Snapshot::new(
        now,
        vec![song],
        Vec::new(),
        vec![Tombstone::new(RecordKind::Setlist, "remote-delete", now)],
    );
    import_snapshot(&db, &incoming).await.unwrap();

    let exported = db.export_all().await.unwrap();
    assert_eq!(exported.songs.len(), 1);
    assert_eq!(exported.tombstones.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn export_then_import_moves_catalog_between_databases() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let target_path = dir.path().join("target.db");
    let document = dir.path().join("catalog.json");

    {
        let source = Database::open(&source_path).await.unwrap();
        let repo = LibSqlCatalogRepository::new(source.connection());
        repo.create_song(&Song::new("How Great Thou Art"))
            .await
            .unwrap();
        repo.create_song(&Song::new("Cornerstone")).await.unwrap();
    }

    run_export(Some(document.as_path()), &source_path).await.unwrap();
    run_import(&document, &target_path).await.unwrap();

    let target = Database::open(&target_path).await.unwrap();
    let status = load_status(&target).await.unwrap();
    assert_eq!(status.song_count, 2);
    assert_eq!(status.setlist_count, 0);
    assert!(status.remotes.is_empty());
}
