//! Wires adapter, queue, worker pool and depth reporter together and runs
//! them until shutdown.
//!
//! Shutdown order: the adapter stops and drops its producer handle, the
//! workers drain what is queued (bounded by the drain timeout), then the
//! reporter stops. An abort (a write failure under
//! [`WriteFailurePolicy::Abort`](bridge_core::WriteFailurePolicy::Abort) or a
//! coercion failure under `CoercionPolicy::Abort`) skips the drain.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bridge_bus::EventSubscriber;
use bridge_core::{BridgeConfig, PipelineConfig, PointSink};

use crate::adapter::{AdapterStats, SubscriptionAdapter};
use crate::error::IngestError;
use crate::normalize::Normalizer;
use crate::pool::WorkerPool;
use crate::queue::ingest_queue;
use crate::reporter::DepthReporter;

/// Final counters of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub adapter: AdapterStats,
    pub written: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    payload_type: String,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, payload_type: impl Into<String>) -> Self {
        Self {
            config,
            payload_type: payload_type.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.pipeline.clone(), config.bus.payload_type.clone())
    }

    /// Run until `shutdown` is cancelled or a policy aborts.
    ///
    /// `subscriber` must already be subscribed to the topics of interest.
    pub async fn run<S>(
        self,
        subscriber: &S,
        sink: Arc<dyn PointSink>,
        shutdown: CancellationToken,
    ) -> Result<PipelineReport, IngestError>
    where
        S: EventSubscriber + ?Sized,
    {
        self.config.validate()?;
        let normalizer = Normalizer::from_config(&self.config)?;
        let (queue, receiver) = ingest_queue(self.config.queue_capacity)?;
        let receiver = Arc::new(receiver);

        // `abort` stops everything without draining; `stop` only ends intake.
        let abort = CancellationToken::new();
        let stop = CancellationToken::new();
        let watcher = tokio::spawn({
            let (shutdown, abort, stop) = (shutdown.clone(), abort.clone(), stop.clone());
            async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = abort.cancelled() => {}
                }
                stop.cancel();
            }
        });

        let mut pool = WorkerPool::spawn(
            self.config.worker_count,
            self.config.write_failure_policy,
            receiver.clone(),
            sink,
            abort.clone(),
        );
        let reporter_cancel = CancellationToken::new();
        let reporter = tokio::spawn(
            DepthReporter::new(receiver.depth(), self.config.depth_report_interval())
                .run(reporter_cancel.clone()),
        );

        info!(
            capacity = self.config.queue_capacity,
            workers = self.config.worker_count,
            "pipeline started"
        );

        let adapter = SubscriptionAdapter::new(self.payload_type, normalizer, queue);
        let adapter_result = adapter.run(subscriber, stop).await;
        if adapter_result.is_err() {
            abort.cancel();
        }

        info!(
            remaining = receiver.depth().get(),
            "intake stopped, draining queue"
        );
        let drain_timeout = self.config.drain_timeout();
        let drained = tokio::time::timeout(drain_timeout, pool.join()).await;
        let pool_result = match drained {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    remaining = receiver.depth().get(),
                    timeout_secs = drain_timeout.as_secs(),
                    "drain timed out, stopping workers"
                );
                pool.shutdown_now().await;
                Ok(())
            }
        };

        reporter_cancel.cancel();
        let reports = reporter.await?;
        watcher.abort();

        let stats = pool.stats();
        let adapter_stats = adapter_result?;
        pool_result?;

        let report = PipelineReport {
            adapter: adapter_stats,
            written: stats.written(),
            failed: stats.failed(),
        };
        info!(
            received = report.adapter.received,
            enqueued = report.adapter.enqueued,
            dropped = report.adapter.dropped,
            skipped = report.adapter.skipped(),
            written = report.written,
            failed = report.failed,
            depth_reports = reports,
            "pipeline stopped"
        );
        Ok(report)
    }
}
