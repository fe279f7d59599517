use std::path::Path;

use cadence_core::db::Database;
use cadence_core::store::{LocalStore, SyncConfigStore, TombstoneStore};
use cadence_core::sync::{ChangeItem, PullOutcome, RemoteKind, SyncDiff, SyncEngine, SyncReport};
use cadence_core::RecordKind;
use serde::Serialize;

use crate::cli::SyncCommands;
use crate::commands::common::{
    format_sync_timestamp, open_database, open_remote, select_sync_config, short_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct RemoteStatusItem {
    pub adapter: RemoteKind,
    pub last_version_token: Option<String>,
    pub last_synced_at: Option<i64>,
    pub last_synced_at_iso: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub remotes: Vec<RemoteStatusItem>,
    pub song_count: usize,
    pub setlist_count: usize,
    pub tombstone_count: usize,
}

#[derive(Debug, Serialize)]
struct ReviewOutput<'a> {
    diff: Option<&'a SyncDiff>,
    pushed: Option<&'a [ChangeItem]>,
    report: Option<&'a SyncReport>,
}

/// What `sync review` should push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Nothing,
    Items(Vec<String>),
    /// No choice given; show the diff only
    Undecided,
}

impl Selection {
    pub fn from_flags(select: Vec<String>, all: bool, none: bool) -> Self {
        if all {
            Self::All
        } else if none {
            Self::Nothing
        } else if select.is_empty() {
            Self::Undecided
        } else {
            Self::Items(select)
        }
    }
}

pub async fn run_sync(
    command: Option<SyncCommands>,
    remote: Option<RemoteKind>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        None => run_full_sync(remote, db_path).await,
        Some(SyncCommands::Review {
            select,
            all,
            none,
            json,
        }) => {
            run_review(
                remote,
                Selection::from_flags(select, all, none),
                json,
                db_path,
            )
            .await
        }
        Some(SyncCommands::Status { json }) => run_status(json, db_path).await,
    }
}

pub fn format_report(report: &SyncReport) -> String {
    format!(
        "Sync {}: {} songs, {} setlists (version {})",
        report.status, report.song_count, report.setlist_count, report.version_token
    )
}

async fn run_full_sync(kind: Option<RemoteKind>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mut config = select_sync_config(&db, kind).await?;
    let remote = open_remote(&config)?;

    let report = SyncEngine::new(&db, &remote, &mut config).sync().await?;
    println!("{}", format_report(&report));
    Ok(())
}

fn parse_selector(selector: &str) -> Result<(RecordKind, &str), CliError> {
    let invalid = || CliError::InvalidSelection(selector.to_string());
    let (kind, id) = selector.trim().split_once(':').ok_or_else(invalid)?;
    let kind = kind.trim().parse::<RecordKind>().map_err(|_| invalid())?;
    let id = id.trim();
    if id.is_empty() {
        return Err(invalid());
    }
    Ok((kind, id))
}

/// Resolve `TYPE:ID` selectors against the outgoing changes.
///
/// An id may be a prefix as long as it matches exactly one outgoing change of
/// that type.
pub fn select_items(
    outgoing: &[ChangeItem],
    selection: &Selection,
) -> Result<Vec<ChangeItem>, CliError> {
    let selectors = match selection {
        Selection::All => return Ok(outgoing.to_vec()),
        Selection::Nothing | Selection::Undecided => return Ok(Vec::new()),
        Selection::Items(selectors) => selectors,
    };

    let mut selected: Vec<ChangeItem> = Vec::new();
    for selector in selectors {
        let (kind, id) = parse_selector(selector)?;
        let matches = outgoing
            .iter()
            .filter(|item| item.kind == kind && item.id.starts_with(id))
            .collect::<Vec<_>>();
        let item = match matches.as_slice() {
            [item] => *item,
            [] => return Err(CliError::UnknownSelection(selector.clone())),
            many => many
                .iter()
                .find(|item| item.id == id)
                .copied()
                .ok_or_else(|| CliError::AmbiguousSelection(selector.clone()))?,
        };
        if !selected.iter().any(|existing| existing.same_record(item)) {
            selected.push(item.clone());
        }
    }
    Ok(selected)
}

pub fn format_change_lines(items: &[ChangeItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "{:<8}  {:<7}  {:<13}  {}",
                item.change.as_str(),
                item.kind.as_str(),
                short_id(&item.id),
                item.name
            )
        })
        .collect()
}

async fn run_review(
    kind: Option<RemoteKind>,
    selection: Selection,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mut config = select_sync_config(&db, kind).await?;
    let remote = open_remote(&config)?;
    let mut engine = SyncEngine::new(&db, &remote, &mut config);

    let pending = match engine.pull_and_diff().await? {
        PullOutcome::Created(report) => {
            if as_json {
                let output = ReviewOutput {
                    diff: None,
                    pushed: None,
                    report: Some(&report),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", format_report(&report));
            }
            return Ok(());
        }
        PullOutcome::Review(pending) => pending,
    };

    let selected = select_items(&pending.diff.outgoing, &selection)?;
    // With nothing outgoing there is nothing to decide; record the pull.
    let report = if selection == Selection::Undecided && !pending.diff.outgoing.is_empty() {
        None
    } else {
        Some(engine.push_selected(&pending.context, &selected).await?)
    };

    if as_json {
        let output = ReviewOutput {
            diff: Some(&pending.diff),
            pushed: report.as_ref().map(|_| selected.as_slice()),
            report: report.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if pending.diff.incoming.is_empty() {
        println!("No incoming changes.");
    } else {
        println!("Applied incoming changes:");
        for line in format_change_lines(&pending.diff.incoming) {
            println!("  {line}");
        }
    }
    if pending.diff.outgoing.is_empty() {
        println!("No outgoing changes.");
    } else {
        println!("Outgoing changes:");
        for line in format_change_lines(&pending.diff.outgoing) {
            println!("  {line}");
        }
    }

    match report {
        Some(report) => println!("{}", format_report(&report)),
        None if !pending.diff.outgoing.is_empty() => println!(
            "Nothing pushed. Re-run with --all, --none or --select TYPE:ID to push."
        ),
        None => {}
    }
    Ok(())
}

pub async fn load_status(db: &Database) -> Result<SyncStatusItem, CliError> {
    let remotes = db
        .list_sync_configs()
        .await?
        .into_iter()
        .map(|config| RemoteStatusItem {
            adapter: config.kind(),
            last_synced_at_iso: config.last_synced_at.map(format_sync_timestamp),
            last_version_token: config.last_version_token,
            last_synced_at: config.last_synced_at,
        })
        .collect();

    Ok(SyncStatusItem {
        remotes,
        song_count: db.count_records(RecordKind::Song).await?,
        setlist_count: db.count_records(RecordKind::Setlist).await?,
        tombstone_count: db.list_tombstones().await?.len(),
    })
}

async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let status = load_status(&db).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.remotes.is_empty() {
        println!("No remote connected.");
    }
    for remote in &status.remotes {
        let synced = remote
            .last_synced_at_iso
            .as_deref()
            .unwrap_or("never synced");
        let token = remote.last_version_token.as_deref().unwrap_or("-");
        println!("{:<8}  {synced}  version {token}", remote.adapter.as_str());
    }
    println!(
        "{} songs, {} setlists, {} pending tombstones",
        status.song_count, status.setlist_count, status.tombstone_count
    );
    Ok(())
}
