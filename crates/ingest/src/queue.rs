//! Bounded ingestion queue with non-blocking admission.
//!
//! Producers hold an [`IngestQueue`] and call [`IngestQueue::try_enqueue`],
//! which never waits: a full queue sheds the record instead of stalling the
//! subscription. Workers share one [`QueueReceiver`]. Once every producer
//! handle is dropped the receiver drains what is left and then reports the
//! queue as closed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

use bridge_core::{CoreError, InsertRecord};

/// Approximate number of records enqueued but not yet written.
///
/// Owned by the queue; everyone else gets this read-only view.
#[derive(Debug, Clone, Default)]
pub struct QueueDepth(Arc<AtomicI64>);

impl QueueDepth {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Create a queue holding at most `capacity` records.
pub fn ingest_queue(capacity: usize) -> Result<(IngestQueue, QueueReceiver), CoreError> {
    if capacity == 0 {
        return Err(CoreError::Config("queue capacity must be > 0".into()));
    }
    let (tx, rx) = mpsc::channel(capacity);
    let depth = QueueDepth::default();
    Ok((
        IngestQueue {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver {
            rx: Mutex::new(rx),
            depth,
        },
    ))
}

/// Producer side of the queue. Cloning adds another producer.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<InsertRecord>,
    depth: QueueDepth,
}

impl IngestQueue {
    /// Admit `record` if there is room. Returns `false` (and discards the
    /// record) when the queue is full or closed; the caller logs the drop.
    pub fn try_enqueue(&self, record: InsertRecord) -> bool {
        // Count first so a fast worker can never complete a record that
        // has not been counted yet.
        self.depth.increment();
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.depth.decrement();
                false
            }
        }
    }

    /// Records currently held by the queue.
    pub fn occupancy(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }
}

/// Consumer side of the queue, shared by all workers.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: Mutex<mpsc::Receiver<InsertRecord>>,
    depth: QueueDepth,
}

impl QueueReceiver {
    /// Wait for the next record. `None` once the queue is closed and empty.
    ///
    /// Cancel safe: dropping the future never loses a record.
    pub async fn dequeue(&self) -> Option<InsertRecord> {
        self.rx.lock().await.recv().await
    }

    /// Mark one dequeued record as finished, whether its write succeeded or not.
    pub fn complete(&self) {
        self.depth.decrement();
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }
}
