//! Cancellable periodic background loops

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;

/// Cadence of a periodic task
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    /// Sleep after a successful run
    pub interval: Duration,
    /// Sleep after a failed run
    pub retry: Duration,
}

impl Cadence {
    /// Create a cadence
    pub fn new(interval: Duration, retry: Duration) -> Self {
        Self { interval, retry }
    }
}

/// Run `task` immediately and then on `cadence` until `token` is cancelled.
///
/// A failed run is logged and the loop sleeps for the retry interval; the loop
/// itself never terminates on error.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    cadence: Cadence,
    token: CancellationToken,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(
        task = name,
        interval = %humantime::format_duration(cadence.interval),
        "Starting background task"
    );

    loop {
        if token.is_cancelled() {
            break;
        }

        let pause = match task().await {
            Ok(()) => cadence.interval,
            Err(e) => {
                error!(task = name, error = %e, "Background task failed");
                cadence.retry
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!(task = name, "Background task stopped");
}
