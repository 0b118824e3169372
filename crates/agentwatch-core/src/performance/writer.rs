//! Periodic performance snapshots

use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use super::PerformanceTracker;
use crate::error::Result;
use crate::schedule::Cadence;
use crate::store::timestamped_name;

impl PerformanceTracker {
    /// Write `performance_<timestamp>.json`; skipped while no span has completed
    pub async fn persist_snapshot(&self) -> Result<Option<PathBuf>> {
        let now = Utc::now();
        let Some(snapshot) = self.snapshot(now) else {
            return Ok(None);
        };

        let path = self
            .store
            .write(&timestamped_name("performance", now), &snapshot)
            .await?;

        debug!(
            path = %path.display(),
            categories = snapshot.metrics.len(),
            "Wrote performance snapshot"
        );
        Ok(Some(path))
    }

    /// Cadence of the snapshot writer
    pub fn writer_cadence(&self) -> Cadence {
        Cadence::new(self.config.write_interval, self.config.retry_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> PerformanceTracker {
        PerformanceTracker::new(PerformanceConfig {
            directory: dir.path().to_path_buf(),
            ..PerformanceConfig::default()
        })
    }

    #[tokio::test]
    async fn test_empty_tracker_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        assert!(tracker.persist_snapshot().await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_persist_snapshot() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.record_timing("get_balance", "tool_execution", Duration::from_millis(12), Some("r1"));

        let path = tracker.persist_snapshot().await.unwrap().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("performance_"));

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(body["metrics"]["tool_execution"]["count"], 1);
        assert_eq!(body["metrics"]["tool_execution"]["threshold_ms"], 500.0);
        assert_eq!(
            body["traces"]["tool_execution"][0]["metadata"]["request_id"],
            "r1"
        );
    }
}
