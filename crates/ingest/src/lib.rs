//! Ingestion pipeline: bus messages are normalized into insert records,
//! queued with load shedding, and written to the time-series store by a
//! fixed pool of workers.

pub mod adapter;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod reporter;

pub use adapter::{AdapterStats, Outcome, SubscriptionAdapter};
pub use error::{IngestError, NormalizeError, PayloadError};
pub use normalize::{decode_payload, Normalized, Normalizer, Payload, SeriesMapper};
pub use pipeline::{Pipeline, PipelineReport};
pub use pool::{PoolStats, WorkerPool};
pub use queue::{ingest_queue, IngestQueue, QueueDepth, QueueReceiver};
pub use reporter::DepthReporter;
