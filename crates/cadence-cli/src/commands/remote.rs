use std::env;
use std::path::Path;

use cadence_core::store::{BaselineStore, SyncConfigStore};
use cadence_core::sync::{
    DropboxConfig, GitHubConfig, LocalFileConfig, RemoteConfig, RemoteKind, RemoteSyncPort,
    SyncConfig,
};
use cadence_core::util::{is_http_url, normalize_text_option};

use crate::cli::{ConnectCommands, RemoteCommands};
use crate::commands::common::{
    normalize_required, open_database, open_remote, select_sync_config, with_credentials,
};
use crate::error::CliError;

pub async fn run_remote(command: RemoteCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        RemoteCommands::Connect { target } => run_connect(target, db_path).await,
        RemoteCommands::Disconnect { kind } => run_disconnect(kind.into(), db_path).await,
        RemoteCommands::Test { kind } => run_test(kind.map(Into::into), db_path).await,
    }
}

/// Validate connect arguments into a remote config
pub fn remote_config_from_args(target: ConnectCommands) -> Result<RemoteConfig, CliError> {
    match target {
        ConnectCommands::Github {
            owner,
            repo,
            path,
            branch,
            token,
            api_url,
        } => {
            let api_base_url = normalize_text_option(api_url);
            if let Some(url) = api_base_url.as_deref() {
                if !is_http_url(url) {
                    return Err(CliError::Config(
                        "api_url must include http:// or https://".to_string(),
                    ));
                }
            }
            Ok(RemoteConfig::GitHub(GitHubConfig {
                owner: normalize_required(&owner, "Repository owner")?,
                repo: normalize_required(&repo, "Repository name")?,
                path: normalize_required(&path, "Document path")?,
                branch: normalize_text_option(branch),
                token: normalize_text_option(token),
                api_base_url,
            }))
        }
        ConnectCommands::Dropbox {
            path,
            app_key,
            refresh_token,
        } => {
            let path = normalize_required(&path, "Dropbox path")?;
            if !path.starts_with('/') {
                return Err(CliError::Config(
                    "Dropbox path must start with '/'".to_string(),
                ));
            }
            Ok(RemoteConfig::Dropbox(DropboxConfig {
                path,
                app_key: normalize_text_option(app_key),
                refresh_token: normalize_text_option(refresh_token),
                api_base_url: None,
                content_base_url: None,
            }))
        }
        ConnectCommands::File { path } => {
            if path.as_os_str().is_empty() {
                return Err(CliError::EmptyValue("File path"));
            }
            Ok(RemoteConfig::File(LocalFileConfig { path }))
        }
    }
}

async fn run_connect(target: ConnectCommands, db_path: &Path) -> Result<(), CliError> {
    let remote = remote_config_from_args(target)?;
    let kind = remote.kind();
    let ready = with_credentials(remote.clone(), |name| env::var(name).ok()).is_configured();

    let db = open_database(db_path).await?;
    db.save_sync_config(&SyncConfig::new(remote)).await?;
    // A new document location starts from first-sync semantics.
    db.clear_baseline(kind).await?;

    println!("Connected {kind} remote");
    if !ready {
        println!(
            "Credentials are missing; pass them to `cadence remote connect {kind}` or set them in the environment."
        );
    }
    Ok(())
}

async fn run_disconnect(kind: RemoteKind, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    if db.delete_sync_config(kind).await? {
        println!("Disconnected {kind} remote");
        Ok(())
    } else {
        Err(CliError::RemoteNotConnected(kind))
    }
}

async fn run_test(kind: Option<RemoteKind>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let config = select_sync_config(&db, kind).await?;
    let remote = open_remote(&config)?;

    let description = remote.test_connection().await?;
    println!("{} remote reachable: {description}", config.kind());
    Ok(())
}
