//! Remote document hosts.
//!
//! Every host is reduced to the four operations of [`RemoteSyncPort`]. Version
//! tokens are opaque to the engine: a blob SHA on GitHub, a file `rev` on
//! Dropbox, a content hash for local files.

mod dropbox;
mod github;
mod local_file;
mod memory;

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::snapshot::Snapshot;
use crate::sync::config::RemoteConfig;
use crate::sync::error::{SyncError, SyncResult};
use crate::util::compact_text;

pub use dropbox::DropboxRemote;
pub use github::GitHubRemote;
pub use local_file::LocalFileRemote;
pub use memory::MemoryRemote;

/// Per-request timeout for host APIs
pub const HTTP_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("cadence/", env!("CARGO_PKG_VERSION"));

/// A remote document together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct PulledSnapshot {
    pub snapshot: Snapshot,
    pub version_token: String,
}

/// Host-agnostic access to the shared snapshot document (async)
#[allow(async_fn_in_trait)]
pub trait RemoteSyncPort {
    /// Whether all required connection fields are present
    fn is_configured(&self) -> bool;

    /// One round trip to the host; returns a human readable identifier
    async fn test_connection(&self) -> SyncResult<String>;

    /// Read the current document, or `None` when it does not exist yet
    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>>;

    /// Write a document and return the new version token.
    ///
    /// With `expected_version` set the write only succeeds when the remote is
    /// still at that version; otherwise [`SyncError::Conflict`] is returned and
    /// nothing is written. With `None` the write is unconditional.
    async fn push(&self, snapshot: &Snapshot, expected_version: Option<&str>)
        -> SyncResult<String>;
}

/// Adapter selected from a stored [`RemoteConfig`]
#[derive(Debug)]
pub enum Remote {
    GitHub(GitHubRemote),
    Dropbox(DropboxRemote),
    File(LocalFileRemote),
}

impl Remote {
    pub fn from_config(config: &RemoteConfig) -> SyncResult<Self> {
        Ok(match config {
            RemoteConfig::GitHub(config) => Self::GitHub(GitHubRemote::new(config.clone())?),
            RemoteConfig::Dropbox(config) => Self::Dropbox(DropboxRemote::new(config.clone())?),
            RemoteConfig::File(config) => Self::File(LocalFileRemote::new(config.clone())),
        })
    }
}

impl RemoteSyncPort for Remote {
    fn is_configured(&self) -> bool {
        match self {
            Self::GitHub(remote) => remote.is_configured(),
            Self::Dropbox(remote) => remote.is_configured(),
            Self::File(remote) => remote.is_configured(),
        }
    }

    async fn test_connection(&self) -> SyncResult<String> {
        match self {
            Self::GitHub(remote) => remote.test_connection().await,
            Self::Dropbox(remote) => remote.test_connection().await,
            Self::File(remote) => remote.test_connection().await,
        }
    }

    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>> {
        match self {
            Self::GitHub(remote) => remote.pull().await,
            Self::Dropbox(remote) => remote.pull().await,
            Self::File(remote) => remote.pull().await,
        }
    }

    async fn push(
        &self,
        snapshot: &Snapshot,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        match self {
            Self::GitHub(remote) => remote.push(snapshot, expected_version).await,
            Self::Dropbox(remote) => remote.push(snapshot, expected_version).await,
            Self::File(remote) => remote.push(snapshot, expected_version).await,
        }
    }
}

pub(crate) fn http_client() -> SyncResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error_summary: Option<String>,
    error_description: Option<String>,
    error: Option<Value>,
}

/// Normalize a non-success response body into [`SyncError::Remote`].
///
/// Understands GitHub (`message`), Dropbox (`error_summary`) and OAuth
/// (`error_description` / `error`) payloads, falling back to the raw body.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> SyncError {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let message = payload
            .message
            .or(payload.error_summary)
            .or(payload.error_description)
            .or_else(|| match payload.error {
                Some(Value::String(error)) => Some(error),
                _ => None,
            })
            .filter(|message| !message.trim().is_empty());
        if let Some(message) = message {
            return SyncError::remote(status.as_u16(), compact_text(&message));
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        SyncError::remote(
            status.as_u16(),
            status.canonical_reason().unwrap_or("request failed"),
        )
    } else {
        SyncError::remote(status.as_u16(), trimmed)
    }
}

/// Read a failed response and convert it with [`parse_api_error`]
pub(crate) async fn error_from_response(response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    parse_api_error(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::config::{GitHubConfig, LocalFileConfig};

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let err = parse_api_error(StatusCode::UNAUTHORIZED, r#"{"message":"Bad credentials"}"#);
        assert_eq!(err.to_string(), "remote error: Bad credentials (401)");

        let err = parse_api_error(
            StatusCode::CONFLICT,
            r#"{"error_summary":"path/not_found/..","error":{".tag":"path"}}"#,
        );
        assert_eq!(err.to_string(), "remote error: path/not_found/.. (409)");

        let err = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"refresh token is malformed"}"#,
        );
        assert_eq!(
            err.to_string(),
            "remote error: refresh token is malformed (400)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body_or_reason() {
        let err = parse_api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.to_string(), "remote error: upstream down (502)");

        let err = parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "   ");
        assert_eq!(
            err.to_string(),
            "remote error: Internal Server Error (500)"
        );
    }

    #[test]
    fn remote_is_selected_from_config() {
        let remote = Remote::from_config(&RemoteConfig::File(LocalFileConfig {
            path: "/tmp/cadence.json".into(),
        }))
        .unwrap();
        assert!(matches!(remote, Remote::File(_)));
        assert!(remote.is_configured());

        let remote = Remote::from_config(&RemoteConfig::GitHub(GitHubConfig {
            owner: "octo".into(),
            repo: "songs".into(),
            path: "cadence.json".into(),
            branch: None,
            token: None,
            api_base_url: None,
        }))
        .unwrap();
        assert!(!remote.is_configured());
    }
}
