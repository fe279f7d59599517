use std::env;
use std::path::{Path, PathBuf};

use cadence_core::db::Database;
use cadence_core::store::SyncConfigStore;
use cadence_core::sync::{Remote, RemoteConfig, RemoteKind, SyncConfig};
use cadence_core::util::normalize_text_option;

use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub const GITHUB_TOKEN_ENV: &str = "CADENCE_GITHUB_TOKEN";
pub const DROPBOX_APP_KEY_ENV: &str = "CADENCE_DROPBOX_APP_KEY";
pub const DROPBOX_REFRESH_TOKEN_ENV: &str = "CADENCE_DROPBOX_REFRESH_TOKEN";

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    profile: Option<&str>,
) -> Result<PathBuf, CliError> {
    let explicit = cli_db_path.or_else(|| env::var_os("CADENCE_DB_PATH").map(PathBuf::from));
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    config
        .resolve_db_path(&profile_name, explicit)
        .map_err(CliError::Config)
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    let db = Database::open(path).await?;
    tracing::debug!(path = %path.display(), "Opened database");
    Ok(db)
}

pub fn normalize_required(value: &str, label: &'static str) -> Result<String, CliError> {
    normalize_text_option(Some(value.to_string())).ok_or(CliError::EmptyValue(label))
}

pub fn read_content_file(path: &Path) -> Result<String, CliError> {
    Ok(std::fs::read_to_string(path)?)
}

/// Leading characters of an id, enough to pass back as a prefix
pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Pick the sync config to use.
///
/// An explicit kind must be connected. Without one, the single connected
/// remote is used.
pub async fn select_sync_config<S: SyncConfigStore>(
    store: &S,
    requested: Option<RemoteKind>,
) -> Result<SyncConfig, CliError> {
    if let Some(kind) = requested {
        return store
            .load_sync_config(kind)
            .await?
            .ok_or(CliError::RemoteNotConnected(kind));
    }

    let mut configs = store.list_sync_configs().await?;
    match configs.len() {
        0 => Err(CliError::NoRemote),
        1 => Ok(configs.remove(0)),
        _ => Err(CliError::AmbiguousRemote(
            configs
                .iter()
                .map(|config| config.kind().as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

/// Fill credentials the stored config lacks from `lookup`.
///
/// Stored values win so a profile keeps working when the environment changes.
pub fn with_credentials(
    remote: RemoteConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> RemoteConfig {
    let from_env = |name: &str| normalize_text_option(lookup(name));
    match remote {
        RemoteConfig::GitHub(mut config) => {
            config.token = normalize_text_option(config.token).or_else(|| from_env(GITHUB_TOKEN_ENV));
            RemoteConfig::GitHub(config)
        }
        RemoteConfig::Dropbox(mut config) => {
            config.app_key =
                normalize_text_option(config.app_key).or_else(|| from_env(DROPBOX_APP_KEY_ENV));
            config.refresh_token = normalize_text_option(config.refresh_token)
                .or_else(|| from_env(DROPBOX_REFRESH_TOKEN_ENV));
            RemoteConfig::Dropbox(config)
        }
        other @ RemoteConfig::File(_) => other,
    }
}

/// Build the adapter for a stored config, with environment credentials applied
pub fn open_remote(config: &SyncConfig) -> Result<Remote, CliError> {
    let remote = with_credentials(config.remote.clone(), |name| env::var(name).ok());
    Ok(Remote::from_config(&remote)?)
}
