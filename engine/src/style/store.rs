//! Style profile storage

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::style::StyleProfile;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of the user's current style profile
#[async_trait]
pub trait StyleProfileStore: Send + Sync {
    /// The current profile, active or not; `None` before any analysis ran
    async fn active_profile(&self) -> Result<Option<StyleProfile>>;
}

/// Profile stored as a JSON file, written by the style analysis job
pub struct FileStyleProfileStore {
    path: PathBuf,
}

impl FileStyleProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StyleProfileStore for FileStyleProfileStore {
    async fn active_profile(&self) -> Result<Option<StyleProfile>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No style profile at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read style profile {}", self.path.display())
                })
            }
        };

        let profile: StyleProfile =
            serde_json::from_str(&contents).context("Failed to parse style profile")?;

        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_no_profile() {
        let dir = TempDir::new().unwrap();
        let store = FileStyleProfileStore::new(dir.path().join("none.json"));
        assert!(store.active_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_minimal_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(
            &path,
            r#"{"id": "p1", "is_active": false, "tone": {"formality_score": 40}}"#,
        )
        .unwrap();

        let profile = FileStyleProfileStore::new(&path)
            .active_profile()
            .await
            .unwrap()
            .unwrap();
        assert!(!profile.is_active);
        assert_eq!(profile.tone.formality_score, 40);
        assert_eq!(profile.structure.avg_sentence_length, 14.0);
    }

    #[tokio::test]
    async fn test_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(FileStyleProfileStore::new(&path).active_profile().await.is_err());
    }
}
