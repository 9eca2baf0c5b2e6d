use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::queue::QueueDepth;

/// Periodically logs the queue depth so backlog is visible in the logs.
#[derive(Debug, Clone)]
pub struct DepthReporter {
    depth: QueueDepth,
    interval: Duration,
}

impl DepthReporter {
    pub fn new(depth: QueueDepth, interval: Duration) -> Self {
        Self { depth, interval }
    }

    /// Log once per interval until `cancel` fires. Returns the number of
    /// reports emitted.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the first report is one
        // interval after startup.
        ticker.tick().await;

        let mut reports = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    info!(insert_queue = self.depth.get(), "queue depth");
                    reports += 1;
                }
            }
        }
        reports
    }
}
