//! Plain file adapter, for folders kept in sync by some other tool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{PulledSnapshot, RemoteSyncPort};
use crate::snapshot::{self, Snapshot};
use crate::sync::config::LocalFileConfig;
use crate::sync::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub struct LocalFileRemote {
    config: LocalFileConfig,
}

/// Version token for file contents: lowercase SHA-256 hex
fn content_token(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl LocalFileRemote {
    #[must_use]
    pub const fn new(config: LocalFileConfig) -> Self {
        Self { config }
    }

    fn path(&self) -> &Path {
        &self.config.path
    }

    async fn read(&self) -> SyncResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path()
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path().with_file_name(name)
    }
}

impl RemoteSyncPort for LocalFileRemote {
    fn is_configured(&self) -> bool {
        !self.path().as_os_str().is_empty()
    }

    async fn test_connection(&self) -> SyncResult<String> {
        let parent = self
            .path()
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let metadata = tokio::fs::metadata(parent).await?;
        if !metadata.is_dir() {
            return Err(SyncError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", parent.display()),
            )));
        }
        Ok(format!("file:{}", self.path().display()))
    }

    async fn pull(&self) -> SyncResult<Option<PulledSnapshot>> {
        let Some(bytes) = self.read().await? else {
            return Ok(None);
        };
        let snapshot = snapshot::decode(&bytes)?;
        Ok(Some(PulledSnapshot {
            snapshot,
            version_token: content_token(&bytes),
        }))
    }

    async fn push(
        &self,
        snapshot: &Snapshot,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        if let Some(expected) = expected_version {
            let current = self.read().await?.map(|bytes| content_token(&bytes));
            if current.as_deref() != Some(expected) {
                return Err(SyncError::Conflict);
            }
        }

        let bytes = snapshot::encode(snapshot)?;
        if let Some(parent) = self.path().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &bytes).await?;
        if let Err(error) = tokio::fs::rename(&temp_path, self.path()).await {
            tokio::fs::remove_file(&temp_path).await.ok();
            return Err(error.into());
        }

        let token = content_token(&bytes);
        tracing::debug!(path = %self.path().display(), token = %token, "Wrote snapshot file");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Song;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn remote_at(path: PathBuf) -> LocalFileRemote {
        LocalFileRemote::new(LocalFileConfig { path })
    }

    fn snapshot_with(title: &str) -> Snapshot {
        Snapshot::new(1, vec![Song::new(title)], Vec::new(), Vec::new())
    }

    #[tokio::test]
    async fn missing_file_pulls_none() {
        let tmp = tempdir().unwrap();
        let remote = remote_at(tmp.path().join("cadence.json"));
        assert!(remote.pull().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_then_pull_returns_same_token() {
        let tmp = tempdir().unwrap();
        let remote = remote_at(tmp.path().join("nested").join("cadence.json"));
        let snapshot = snapshot_with("Jolene");

        let token = remote.push(&snapshot, None).await.unwrap();
        let pulled = remote.pull().await.unwrap().unwrap();

        assert_eq!(pulled.version_token, token);
        assert_eq!(pulled.snapshot, snapshot);
        assert_eq!(token.len(), 64);
    }

    #[tokio::test]
    async fn stale_token_conflicts_without_writing() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cadence.json");
        let remote = remote_at(path.clone());

        let first = remote.push(&snapshot_with("One"), None).await.unwrap();
        let second = remote.push(&snapshot_with("Two"), Some(&first)).await.unwrap();
        assert_ne!(first, second);

        let before = std::fs::read(&path).unwrap();
        let result = remote.push(&snapshot_with("Three"), Some(&first)).await;
        assert!(matches!(result, Err(SyncError::Conflict)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn expected_token_on_missing_file_conflicts() {
        let tmp = tempdir().unwrap();
        let remote = remote_at(tmp.path().join("cadence.json"));
        let result = remote.push(&snapshot_with("One"), Some("abc")).await;
        assert!(matches!(result, Err(SyncError::Conflict)));
    }

    #[tokio::test]
    async fn invalid_document_is_a_schema_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cadence.json");
        std::fs::write(&path, br#"{"version": 9}"#).unwrap();

        let result = remote_at(path).pull().await;
        assert!(matches!(result, Err(SyncError::Schema(_))));
    }

    #[tokio::test]
    async fn test_connection_checks_parent_directory() {
        let tmp = tempdir().unwrap();
        let remote = remote_at(tmp.path().join("cadence.json"));
        assert!(remote.test_connection().await.unwrap().starts_with("file:"));

        let missing = remote_at(tmp.path().join("missing").join("cadence.json"));
        assert!(matches!(
            missing.test_connection().await,
            Err(SyncError::Io(_))
        ));
    }
}
