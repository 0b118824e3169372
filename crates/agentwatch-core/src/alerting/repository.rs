//! Alert record persistence
//!
//! Records are queued through a bounded channel and written by a single
//! writer task, so triggering or resolving an alert never waits on disk.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{record_file_name, Alert, AlertStatus};
use crate::store::JsonStore;

/// Writes `<status>_<type>_<id>.json` records for alerts
pub struct AlertRepository {
    store: JsonStore,
    tx: mpsc::Sender<Alert>,
    rx: Mutex<Option<mpsc::Receiver<Alert>>>,
}

impl AlertRepository {
    /// Create a repository writing into `directory` with a queue of `buffer` records
    pub fn new(directory: impl Into<PathBuf>, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            store: JsonStore::new(directory),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Directory the records are written to
    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Queue a record for the writer; returns false when it had to be dropped
    pub fn enqueue(&self, alert: Alert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!(alert_id = %alert.id, "Alert writer queue full, dropping record");
                false
            }
            Err(TrySendError::Closed(alert)) => {
                warn!(alert_id = %alert.id, "Alert writer closed, dropping record");
                false
            }
        }
    }

    /// Write the record for the alert's current status.
    ///
    /// A resolved record replaces the active one.
    pub async fn save(&self, alert: &Alert) -> Result<PathBuf> {
        let path = self.store.write(&alert.file_name(), alert).await?;

        if alert.status == AlertStatus::Resolved {
            let active = record_file_name(AlertStatus::Active, alert.alert_type, &alert.id);
            if self.store.remove(&active).await? {
                debug!(alert_id = %alert.id, "Removed active alert record");
            }
        }
        Ok(path)
    }

    /// Writer loop: persist queued records until `token` is cancelled, then
    /// drain what is still queued.
    pub async fn run(&self, token: CancellationToken) {
        let taken = self.rx.lock().take();
        let Some(mut rx) = taken else {
            error!("Alert writer already running");
            return;
        };
        info!(dir = %self.dir().display(), "Alert writer started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = rx.recv() => match received {
                    Some(alert) => self.save_logged(&alert).await,
                    None => break,
                },
            }
        }

        let drained = self.drain_from(&mut rx).await;
        *self.rx.lock() = Some(rx);
        info!(drained, "Alert writer stopped");
    }

    /// Persist every queued record now; a no-op while the writer task runs
    pub async fn flush(&self) -> usize {
        let taken = self.rx.lock().take();
        let Some(mut rx) = taken else {
            return 0;
        };
        let written = self.drain_from(&mut rx).await;
        *self.rx.lock() = Some(rx);
        written
    }

    async fn drain_from(&self, rx: &mut mpsc::Receiver<Alert>) -> usize {
        let mut count = 0;
        while let Ok(alert) = rx.try_recv() {
            self.save_logged(&alert).await;
            count += 1;
        }
        count
    }

    async fn save_logged(&self, alert: &Alert) {
        if let Err(e) = self.save(alert).await {
            error!(alert_id = %alert.id, error = %e, "Failed to persist alert");
        }
    }
}

impl std::fmt::Debug for AlertRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRepository")
            .field("dir", &self.store.dir())
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, Severity};
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn alert(message: &str) -> Alert {
        Alert::new(
            AlertType::Performance,
            Severity::Warning,
            message,
            serde_json::Map::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_resolved_record_replaces_active() {
        let dir = TempDir::new().unwrap();
        let repo = AlertRepository::new(dir.path(), 8);
        let mut alert = alert("slow tools");

        repo.save(&alert).await.unwrap();
        let active = dir.path().join(alert.file_name());
        assert!(active.exists());

        alert.resolve("recovered", Utc::now());
        let resolved = repo.save(&alert).await.unwrap();
        assert!(resolved.exists());
        assert!(!active.exists());
        assert!(resolved
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("resolved_performance_"));
    }

    #[tokio::test]
    async fn test_full_queue_drops_records() {
        let dir = TempDir::new().unwrap();
        let repo = AlertRepository::new(dir.path(), 1);
        assert!(repo.enqueue(alert("first")));
        assert!(!repo.enqueue(alert("second")));
        assert_eq!(repo.flush().await, 1);
        assert_eq!(repo.flush().await, 0);
    }

    #[tokio::test]
    async fn test_writer_drains_on_cancel() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(AlertRepository::new(dir.path(), 16));
        let token = CancellationToken::new();

        let writer = {
            let repo = repo.clone();
            let token = token.clone();
            tokio::spawn(async move { repo.run(token).await })
        };

        let first = alert("one");
        let second = alert("two");
        repo.enqueue(first.clone());
        repo.enqueue(second.clone());

        token.cancel();
        writer.await.unwrap();

        assert!(dir.path().join(first.file_name()).exists());
        assert!(dir.path().join(second.file_name()).exists());
        // The receiver is handed back, so flushing works again.
        assert_eq!(repo.flush().await, 0);
    }
}
