//! JSON artifact storage
//!
//! Every component persists snapshots as pretty-printed JSON files in its own
//! directory. Callers serialize owned snapshots; nothing here touches
//! component state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::Result;

/// Directory-backed JSON writer
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `file_name` inside the store
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Serialize `value` and write it to `file_name`, replacing any existing file
    pub async fn write<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path(file_name);
        fs::write(&path, bytes).await?;

        debug!(path = %path.display(), "Wrote artifact");
        Ok(path)
    }

    /// Remove `file_name` if present; returns whether a file was removed
    pub async fn remove(&self, file_name: &str) -> Result<bool> {
        match fs::remove_file(self.path(file_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// File names currently in the store, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.json`
pub fn timestamped_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_timestamped_name() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(timestamped_name("metrics", at), "metrics_20250102_030405.json");
    }

    #[tokio::test]
    async fn test_write_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("nested"));

        let path = store
            .write("a.json", &serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert!(path.exists());

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(body["ok"], true);

        assert_eq!(store.list().await.unwrap(), vec!["a.json".to_string()]);
        assert!(store.remove("a.json").await.unwrap());
        assert!(!store.remove("a.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
