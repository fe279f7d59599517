//! Per-profile remote configuration.
//!
//! One [`SyncConfig`] exists per profile and adapter kind. It is created when
//! a remote is connected, updated after every successful push, and deleted on
//! disconnect.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_DROPBOX_API_URL: &str = "https://api.dropboxapi.com";
pub const DEFAULT_DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";
pub const DEFAULT_DOCUMENT_NAME: &str = "cadence.json";

/// Discriminator for the supported remote hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// GitHub repository contents API
    GitHub,
    /// Dropbox files API
    Dropbox,
    /// Plain file on a local or mounted filesystem
    File,
}

impl RemoteKind {
    pub const ALL: [Self; 3] = [Self::GitHub, Self::Dropbox, Self::File];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Dropbox => "dropbox",
            Self::File => "file",
        }
    }
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "dropbox" => Ok(Self::Dropbox),
            "file" => Ok(Self::File),
            other => Err(format!("unknown remote kind '{other}'")),
        }
    }
}

/// Connection settings for a GitHub-hosted document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_document_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Override for GitHub Enterprise or tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

impl GitHubConfig {
    #[must_use]
    pub fn api_base_url(&self) -> String {
        normalize_text_option(self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.owner.trim().is_empty()
            && !self.repo.trim().is_empty()
            && !self.path.trim().trim_matches('/').is_empty()
            && normalize_text_option(self.token.clone()).is_some()
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GitHubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Connection settings for a Dropbox-hosted document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxConfig {
    /// Absolute Dropbox path, e.g. `/Apps/Cadence/cadence.json`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base_url: Option<String>,
}

impl DropboxConfig {
    #[must_use]
    pub fn api_base_url(&self) -> String {
        normalize_text_option(self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_DROPBOX_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    #[must_use]
    pub fn content_base_url(&self) -> String {
        normalize_text_option(self.content_base_url.clone())
            .unwrap_or_else(|| DEFAULT_DROPBOX_CONTENT_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.path.trim().starts_with('/')
            && normalize_text_option(self.app_key.clone()).is_some()
            && normalize_text_option(self.refresh_token.clone()).is_some()
    }
}

impl fmt::Debug for DropboxConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DropboxConfig")
            .field("path", &self.path)
            .field("app_key", &self.app_key)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("content_base_url", &self.content_base_url)
            .finish()
    }
}

/// A document stored as a plain file, typically inside a folder that some
/// other tool keeps in sync between machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileConfig {
    pub path: PathBuf,
}

/// Adapter-specific connection fields, discriminated by adapter kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "lowercase")]
pub enum RemoteConfig {
    #[serde(rename = "github")]
    GitHub(GitHubConfig),
    Dropbox(DropboxConfig),
    File(LocalFileConfig),
}

impl RemoteConfig {
    #[must_use]
    pub const fn kind(&self) -> RemoteKind {
        match self {
            Self::GitHub(_) => RemoteKind::GitHub,
            Self::Dropbox(_) => RemoteKind::Dropbox,
            Self::File(_) => RemoteKind::File,
        }
    }

    /// Whether all required connection fields are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self {
            Self::GitHub(config) => config.is_configured(),
            Self::Dropbox(config) => config.is_configured(),
            Self::File(config) => !config.path.as_os_str().is_empty(),
        }
    }
}

/// Remote connection plus the sync bookkeeping for one profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    /// Remote version identifier as of the last successful push
    #[serde(default)]
    pub last_version_token: Option<String>,
    /// Time of the last successful sync (Unix ms)
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl SyncConfig {
    #[must_use]
    pub const fn new(remote: RemoteConfig) -> Self {
        Self {
            remote,
            last_version_token: None,
            last_synced_at: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RemoteKind {
        self.remote.kind()
    }

    /// Record the outcome of a successful push or up-to-date check.
    pub fn record_sync(&mut self, version_token: impl Into<String>, synced_at: i64) {
        self.last_version_token = Some(version_token.into());
        self.last_synced_at = Some(synced_at);
    }
}

fn default_document_path() -> String {
    DEFAULT_DOCUMENT_NAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn github() -> GitHubConfig {
        GitHubConfig {
            owner: "octo".into(),
            repo: "songs".into(),
            path: "cadence.json".into(),
            branch: None,
            token: Some("ghp_secret".into()),
            api_base_url: None,
        }
    }

    #[test]
    fn remote_kind_round_trips_through_strings() {
        for kind in RemoteKind::ALL {
            assert_eq!(kind.as_str().parse::<RemoteKind>(), Ok(kind));
        }
        assert!("s3".parse::<RemoteKind>().is_err());
    }

    #[test]
    fn sync_config_serializes_with_adapter_tag() {
        let config = SyncConfig::new(RemoteConfig::GitHub(github()));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["remote"]["adapter"], "github");
        assert_eq!(value["remote"]["owner"], "octo");
        assert_eq!(value["lastVersionToken"], serde_json::Value::Null);

        let parsed: SyncConfig = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn github_requires_token() {
        let mut config = github();
        assert!(RemoteConfig::GitHub(config.clone()).is_configured());
        config.token = Some("  ".into());
        assert!(!RemoteConfig::GitHub(config).is_configured());
    }

    #[test]
    fn dropbox_requires_absolute_path_and_credentials() {
        let config = DropboxConfig {
            path: "/Apps/Cadence/cadence.json".into(),
            app_key: Some("key".into()),
            refresh_token: Some("refresh".into()),
            api_base_url: None,
            content_base_url: None,
        };
        assert!(RemoteConfig::Dropbox(config.clone()).is_configured());

        let relative = DropboxConfig {
            path: "cadence.json".into(),
            ..config
        };
        assert!(!RemoteConfig::Dropbox(relative).is_configured());
    }

    #[test]
    fn debug_redacts_credentials() {
        let rendered = format!("{:?}", github());
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn record_sync_updates_bookkeeping() {
        let mut config = SyncConfig::new(RemoteConfig::File(LocalFileConfig {
            path: PathBuf::from("/tmp/cadence.json"),
        }));
        config.record_sync("abc", 42);
        assert_eq!(config.last_version_token.as_deref(), Some("abc"));
        assert_eq!(config.last_synced_at, Some(42));
    }

    #[test]
    fn default_urls_are_used_when_unset() {
        assert_eq!(github().api_base_url(), DEFAULT_GITHUB_API_URL);
        let mut custom = github();
        custom.api_base_url = Some("http://127.0.0.1:9000/".into());
        assert_eq!(custom.api_base_url(), "http://127.0.0.1:9000");
    }
}
