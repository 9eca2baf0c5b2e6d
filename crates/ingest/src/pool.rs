//! Fixed-size pool of sink writers draining the ingestion queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use bridge_core::{PointSink, WriteFailurePolicy};

use crate::error::IngestError;
use crate::queue::QueueReceiver;

/// Running totals across all workers.
#[derive(Debug, Default)]
pub struct PoolStats {
    written: AtomicU64,
    failed: AtomicU64,
}

impl PoolStats {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// `W` interchangeable workers, each writing one record at a time.
///
/// Workers exit when the queue is closed and drained, or immediately when
/// `abort` is cancelled. Under [`WriteFailurePolicy::Abort`] a failed write
/// cancels `abort` itself so the rest of the pipeline stops too.
pub struct WorkerPool {
    tasks: JoinSet<Result<(), IngestError>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        policy: WriteFailurePolicy,
        receiver: Arc<QueueReceiver>,
        sink: Arc<dyn PointSink>,
        abort: CancellationToken,
    ) -> Self {
        let stats = Arc::new(PoolStats::default());
        let mut tasks = JoinSet::new();
        for id in 0..workers {
            tasks.spawn(run_worker(
                id,
                policy,
                receiver.clone(),
                sink.clone(),
                stats.clone(),
                abort.clone(),
            ));
        }
        info!(workers, %policy, "worker pool started");
        Self { tasks, stats }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Workers still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every worker to exit. Returns the first worker error.
    pub async fn join(&mut self) -> Result<(), IngestError> {
        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.map_err(IngestError::from).and_then(|r| r);
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop every worker without waiting for the queue to drain.
    pub async fn shutdown_now(&mut self) {
        self.tasks.shutdown().await;
    }
}

async fn run_worker(
    id: usize,
    policy: WriteFailurePolicy,
    receiver: Arc<QueueReceiver>,
    sink: Arc<dyn PointSink>,
    stats: Arc<PoolStats>,
    abort: CancellationToken,
) -> Result<(), IngestError> {
    loop {
        let record = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            next = receiver.dequeue() => match next {
                Some(record) => record,
                None => break,
            },
        };

        let started = Instant::now();
        let result = sink.write_point(&record).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        receiver.complete();

        match result {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                debug!(
                    worker = id,
                    series = %record.series_path(),
                    elapsed_ms,
                    "record written"
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = id,
                    series = %record.series_path(),
                    timestamp = record.timestamp(),
                    elapsed_ms,
                    error = %e,
                    "sink write failed"
                );
                if policy == WriteFailurePolicy::Abort {
                    abort.cancel();
                    return Err(e.into());
                }
            }
        }
    }
    debug!(worker = id, "worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use bridge_core::{InsertRecord, SinkError};

    use super::*;
    use crate::queue::ingest_queue;

    /// Sink that records writes and fails for timestamps listed in `fail_on`.
    #[derive(Default)]
    struct MockSink {
        written: Mutex<Vec<InsertRecord>>,
        fail_on: Vec<i64>,
    }

    #[async_trait]
    impl PointSink for MockSink {
        async fn write_point(&self, record: &InsertRecord) -> Result<(), SinkError> {
            if self.fail_on.contains(&record.timestamp()) {
                return Err(SinkError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.written.lock().await.push(record.clone());
            Ok(())
        }
    }

    fn record(n: i64) -> InsertRecord {
        InsertRecord::new("hamilton/dev1", n, BTreeMap::from([("v".to_string(), 1.0)]))
    }

    #[tokio::test]
    async fn each_record_written_exactly_once() {
        let (queue, rx) = ingest_queue(100).unwrap();
        for i in 0..50 {
            assert!(queue.try_enqueue(record(i)));
        }
        drop(queue);

        let sink = Arc::new(MockSink::default());
        let rx = Arc::new(rx);
        let mut pool = WorkerPool::spawn(
            4,
            WriteFailurePolicy::Continue,
            rx.clone(),
            sink.clone(),
            CancellationToken::new(),
        );
        assert_eq!(pool.len(), 4);
        pool.join().await.unwrap();

        let mut seen: Vec<i64> = sink.written.lock().await.iter().map(|r| r.timestamp()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
        assert_eq!(pool.stats().written(), 50);
        assert_eq!(rx.depth().get(), 0);
    }

    #[tokio::test]
    async fn failed_write_is_counted_and_pool_continues() {
        let (queue, rx) = ingest_queue(10).unwrap();
        for i in 0..5 {
            assert!(queue.try_enqueue(record(i)));
        }
        drop(queue);

        let sink = Arc::new(MockSink {
            fail_on: vec![2],
            ..MockSink::default()
        });
        let rx = Arc::new(rx);
        let mut pool = WorkerPool::spawn(
            2,
            WriteFailurePolicy::Continue,
            rx.clone(),
            sink.clone(),
            CancellationToken::new(),
        );
        pool.join().await.unwrap();

        assert_eq!(pool.stats().written(), 4);
        assert_eq!(pool.stats().failed(), 1);
        assert_eq!(rx.depth().get(), 0, "failed writes still release depth");
    }

    #[tokio::test]
    async fn abort_policy_stops_the_pool() {
        let (queue, rx) = ingest_queue(10).unwrap();
        assert!(queue.try_enqueue(record(7)));

        let sink = Arc::new(MockSink {
            fail_on: vec![7],
            ..MockSink::default()
        });
        let abort = CancellationToken::new();
        let mut pool = WorkerPool::spawn(
            3,
            WriteFailurePolicy::Abort,
            Arc::new(rx),
            sink,
            abort.clone(),
        );

        // The queue stays open; only the abort can end the workers.
        let result = tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("pool should stop after abort");
        assert!(matches!(result, Err(IngestError::Sink(_))));
        assert!(abort.is_cancelled());
        drop(queue);
    }

    #[tokio::test]
    async fn cancelled_pool_exits_with_open_queue() {
        let (_queue, rx) = ingest_queue(10).unwrap();
        let abort = CancellationToken::new();
        let mut pool = WorkerPool::spawn(
            2,
            WriteFailurePolicy::Continue,
            Arc::new(rx),
            Arc::new(MockSink::default()),
            abort.clone(),
        );
        abort.cancel();
        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("workers should observe cancellation")
            .unwrap();
        assert!(pool.is_empty());
    }
}
