//! Dropbox files adapter.
//!
//! The version token is the file `rev`. Conditional writes use upload mode
//! `update`, which Dropbox rejects with `path/conflict` when the rev moved.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{error_from_response, http_client, parse_api_error, PulledSnapshot, RemoteSyncPort};
use crate::snapshot::{self, Snapshot};
use crate::sync::config::{DropboxConfig, RemoteKind};
use crate::sync::error::{SyncError, SyncResult};

/// Access tokens are refreshed this long before Dropbox says they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 4 * 60 * 60;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct DropboxRemote {
    config: DropboxConfig,
    client: reqwest::Client,
    access_token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for DropboxRemote {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DropboxRemote")
            .field("config", &self.config)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    rev: String,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    email: Option<String>,
    name: AccountName,
}

impl DropboxRemote {
    pub fn new(config: DropboxConfig) -> SyncResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
            access_token: Mutex::new(None),
        })
    }

    fn credentials(&self) -> SyncResult<(&str, &str)> {
        let app_key = self.config.app_key.as_deref().map(str::trim);
        let refresh_token = self.config.refresh_token.as_deref().map(str::trim);
        match (app_key, refresh_token) {
            (Some(app_key), Some(refresh_token))
                if !app_key.is_empty() && !refresh_token.is_empty() =>
            {
                Ok((app_key, refresh_token))
            }
            _ => Err(SyncError::NotConfigured(RemoteKind::Dropbox)),
        }
    }

    /// Exchange the refresh token for a short-lived access token, reusing a
    /// cached one while it is still valid.
    async fn access_token(&self) -> SyncResult<String> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
        {
            return Ok(token.access_token.clone());
        }

        let (app_key, refresh_token) = self.credentials()?;
        let response = self
            .client
            .post(format!("{}/oauth2/token", self.config.api_base_url()))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", app_key),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let payload = response.json::<TokenResponse>().await?;
        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
            .saturating_sub(TOKEN_EXPIRY_SKEW);
        tracing::debug!(expires_in = lifetime.as_secs(), "Refreshed Dropbox access token");

        let access_token = payload.access_token;
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    fn path(&self) -> &str {
        self.config.path.trim()
    }
}

/// Encode a `Dropbox-API-Arg` header value.
///
/// Header values must be ASCII, so every non-ASCII character is written as a
/// JSON `\u` escape.
fn api_arg(value: &Value) -> String {
    let raw = value.to_string();
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            let mut units = [0_u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    escaped
}

fn upload_mode(expected_version: Option<&str>) -> Value {
    match expected_version {
        Some(rev) => json!({ ".tag": "update", "update": rev }),
        None => json!("overwrite"),
    }
}

impl RemoteSyncPort for DropboxRemote {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn test_connection(&self) -> SyncResult<String> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/2/users/get_current_account",
                self.config.api_base_url()
            ))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let account = response.json::<AccountResponse>().await?;
        let who = account
            .email
            .filter(|email| !email.trim().is_empty())
            .unwrap_or(account.name.display_name);
        Ok(format!("{who}:{}", self.path()))
    }

    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/2/files/download", self.config.content_base_url()))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(&json!({ "path": self.path() })))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if body.contains("path/not_found") {
                tracing::debug!(path = self.path(), "Dropbox document does not exist");
                return Ok(None);
            }
            return Err(parse_api_error(status, &body));
        }
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let metadata = response
            .headers()
            .get("dropbox-api-result")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                SyncError::InvalidResponse("download is missing dropbox-api-result".to_string())
            })
            .and_then(|raw| {
                serde_json::from_str::<FileMetadata>(raw).map_err(|error| {
                    SyncError::InvalidResponse(format!("invalid dropbox-api-result: {error}"))
                })
            })?;

        let bytes = response.bytes().await?;
        let snapshot = snapshot::decode(&bytes)?;
        tracing::debug!(rev = %metadata.rev, "Pulled Dropbox document");
        Ok(Some(PulledSnapshot {
            snapshot,
            version_token: metadata.rev,
        }))
    }

    async fn push(
        &self,
        snapshot: &Snapshot,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        let token = self.access_token().await?;
        let arg = json!({
            "path": self.path(),
            "mode": upload_mode(expected_version),
            "autorename": false,
            "mute": true,
        });

        let response = self
            .client
            .post(format!("{}/2/files/upload", self.config.content_base_url()))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(&arg))
            .header("Content-Type", "application/octet-stream")
            .body(snapshot::encode(snapshot)?)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if body.contains("path/conflict") {
                return Err(SyncError::Conflict);
            }
            return Err(parse_api_error(status, &body));
        }
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let metadata = response.json::<FileMetadata>().await?;
        tracing::debug!(rev = %metadata.rev, "Pushed Dropbox document");
        Ok(metadata.rev)
    }
}
