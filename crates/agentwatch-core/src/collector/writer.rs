//! Periodic metrics snapshots

use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use super::MetricsCollector;
use crate::error::Result;
use crate::schedule::Cadence;
use crate::store::timestamped_name;

impl MetricsCollector {
    /// Write `metrics_<timestamp>.json` with the aggregates and recent records
    pub async fn persist_snapshot(&self) -> Result<PathBuf> {
        let now = Utc::now();
        // Lock is released before any serialization or I/O.
        let artifact = self.artifact(now);

        let path = self
            .store
            .write(&timestamped_name("metrics", now), &artifact)
            .await?;

        debug!(
            path = %path.display(),
            records = artifact.recent_requests.len(),
            "Wrote metrics snapshot"
        );
        Ok(path)
    }

    /// Cadence of the snapshot writer
    pub fn writer_cadence(&self) -> Cadence {
        Cadence::new(self.config.write_interval, self.config.retry_interval)
    }
}
