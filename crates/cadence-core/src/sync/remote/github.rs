//! GitHub repository contents adapter.
//!
//! The document lives in a repository file. The version token is the file's
//! blob SHA, which the contents API requires on every update of an existing
//! file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, PulledSnapshot, RemoteSyncPort};
use crate::snapshot::{self, Snapshot};
use crate::sync::config::{GitHubConfig, RemoteKind};
use crate::sync::error::{SyncError, SyncResult};

const API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone)]
pub struct GitHubRemote {
    config: GitHubConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsEntry,
}

#[derive(Debug, Deserialize)]
struct PutContentsEntry {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
}

impl GitHubRemote {
    pub fn new(config: GitHubConfig) -> SyncResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    fn document_path(&self) -> &str {
        self.config.path.trim().trim_matches('/')
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_base_url(),
            urlencoding::encode(self.config.owner.trim()),
            urlencoding::encode(self.config.repo.trim()),
        )
    }

    fn contents_url(&self) -> String {
        let path = self
            .document_path()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/contents/{path}", self.repo_url())
    }

    fn branch(&self) -> Option<&str> {
        self.config
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
    }

    fn request(&self, method: Method, url: &str) -> SyncResult<RequestBuilder> {
        let token = self
            .config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(SyncError::NotConfigured(RemoteKind::GitHub))?;

        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION))
    }

    async fn fetch_contents(&self) -> SyncResult<Option<ContentsResponse>> {
        let mut request = self.request(Method::GET, &self.contents_url())?;
        if let Some(branch) = self.branch() {
            request = request.query(&[("ref", branch)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(Some(response.json::<ContentsResponse>().await?))
    }

    /// Files over 1 MB come back without inline content; read the blob instead.
    async fn fetch_blob(&self, sha: &str) -> SyncResult<Vec<u8>> {
        let url = format!("{}/git/blobs/{}", self.repo_url(), urlencoding::encode(sha));
        let response = self.request(Method::GET, &url)?.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let blob = response.json::<BlobResponse>().await?;
        if blob.encoding != "base64" {
            return Err(SyncError::InvalidResponse(format!(
                "unsupported blob encoding '{}'",
                blob.encoding
            )));
        }
        decode_base64(&blob.content)
    }
}

fn decode_base64(content: &str) -> SyncResult<Vec<u8>> {
    let compact = content
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect::<String>();
    STANDARD
        .decode(compact)
        .map_err(|error| SyncError::InvalidResponse(format!("invalid base64 content: {error}")))
}

fn is_conflict(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("does not match"))
}

impl RemoteSyncPort for GitHubRemote {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn test_connection(&self) -> SyncResult<String> {
        let response = self.request(Method::GET, &self.repo_url())?.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let repository = response.json::<RepositoryResponse>().await?;
        Ok(format!("{}:{}", repository.full_name, self.document_path()))
    }

    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>> {
        let Some(contents) = self.fetch_contents().await? else {
            tracing::debug!(path = self.document_path(), "GitHub document does not exist");
            return Ok(None);
        };

        let inline = contents
            .content
            .as_deref()
            .filter(|content| !content.trim().is_empty());
        let bytes = match (contents.encoding.as_deref(), inline) {
            (Some("base64"), Some(content)) => decode_base64(content)?,
            _ => self.fetch_blob(&contents.sha).await?,
        };

        let snapshot = snapshot::decode(&bytes)?;
        tracing::debug!(sha = %contents.sha, "Pulled GitHub document");
        Ok(Some(PulledSnapshot {
            snapshot,
            version_token: contents.sha,
        }))
    }

    async fn push(
        &self,
        snapshot: &Snapshot,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        let current_sha = match expected_version {
            Some(_) => None,
            None => self.fetch_contents().await?.map(|contents| contents.sha),
        };

        let body = PutContentsRequest {
            message: format!("Update {} from Cadence", self.document_path()),
            content: STANDARD.encode(snapshot::encode(snapshot)?),
            sha: expected_version.or(current_sha.as_deref()),
            branch: self.branch(),
        };

        let response = self
            .request(Method::PUT, &self.contents_url())?
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if is_conflict(status, &text) {
                return Err(SyncError::Conflict);
            }
            return Err(super::parse_api_error(status, &text));
        }

        let written = response.json::<PutContentsResponse>().await?;
        tracing::debug!(sha = %written.content.sha, "Pushed GitHub document");
        Ok(written.content.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(path: &str) -> GitHubRemote {
        GitHubRemote::new(GitHubConfig {
            owner: "octo cat".into(),
            repo: "songs".into(),
            path: path.into(),
            branch: None,
            token: Some("ghp_x".into()),
            api_base_url: Some("http://localhost:9000/".into()),
        })
        .unwrap()
    }

    #[test]
    fn contents_url_encodes_each_segment() {
        assert_eq!(
            remote("/sync/my songs.json").contents_url(),
            "http://localhost:9000/repos/octo%20cat/songs/contents/sync/my%20songs.json"
        );
    }

    #[test]
    fn base64_with_line_breaks_decodes() {
        let encoded = "eyJ2\nZXJz\naW9u\nIjoy\nfQ==\n";
        assert_eq!(decode_base64(encoded).unwrap(), br#"{"version":2}"#);
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn conflict_statuses() {
        assert!(is_conflict(StatusCode::CONFLICT, ""));
        assert!(is_conflict(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"sha does not match"}"#
        ));
        assert!(!is_conflict(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Invalid request"}"#
        ));
    }

    #[test]
    fn missing_token_is_not_configured() {
        let mut remote = remote("cadence.json");
        remote.config.token = None;
        assert!(!remote.is_configured());
        assert!(matches!(
            remote.request(Method::GET, "http://localhost"),
            Err(SyncError::NotConfigured(RemoteKind::GitHub))
        ));
    }
}
