//! Bus subscription adapter: message in, record enqueued (or not).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bridge_bus::{EventSubscriber, Message};
use bridge_core::CoercionPolicy;

use crate::error::{IngestError, NormalizeError};
use crate::normalize::{decode_payload, Normalizer};
use crate::queue::IngestQueue;

/// Pause after a failed `recv` before trying again.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What happened to one bus message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Enqueued,
    /// Queue was full; the record was shed.
    Dropped,
    /// No payload object of the configured type.
    NoPayload,
    DecodeFailed,
    /// The normalizer refused the record and the policy said skip.
    Rejected(NormalizeError),
    /// Every field was skipped; nothing left to write.
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub received: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub no_payload: u64,
    pub decode_errors: u64,
    pub rejected: u64,
    pub empty: u64,
    pub zero_timestamps: u64,
}

impl AdapterStats {
    /// Messages that never reached the queue for a reason other than backlog.
    pub fn skipped(&self) -> u64 {
        self.no_payload + self.decode_errors + self.rejected + self.empty
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Enqueued => self.enqueued += 1,
            Outcome::Dropped => self.dropped += 1,
            Outcome::NoPayload => self.no_payload += 1,
            Outcome::DecodeFailed => self.decode_errors += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::Empty => self.empty += 1,
        }
    }
}

/// Feeds the ingestion queue from a bus subscription.
///
/// Owns one producer handle; dropping the adapter (which `run` does on
/// return) lets the worker pool drain and exit.
pub struct SubscriptionAdapter {
    payload_type: String,
    normalizer: Normalizer,
    queue: IngestQueue,
    stats: AdapterStats,
}

impl SubscriptionAdapter {
    pub fn new(payload_type: impl Into<String>, normalizer: Normalizer, queue: IngestQueue) -> Self {
        Self {
            payload_type: payload_type.into(),
            normalizer,
            queue,
            stats: AdapterStats::default(),
        }
    }

    pub fn stats(&self) -> &AdapterStats {
        &self.stats
    }

    /// Process one message. Only an `Abort` coercion policy turns a bad
    /// payload into an error; everything else is an [`Outcome`].
    pub fn handle(&mut self, message: &Message) -> Result<Outcome, IngestError> {
        self.stats.received += 1;
        let outcome = self.process(message)?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    fn process(&mut self, message: &Message) -> Result<Outcome, IngestError> {
        let topic = message.topic.as_str();

        let Some(po) = message.payload_object(&self.payload_type) else {
            debug!(topic, po_type = %self.payload_type, "no payload object");
            return Ok(Outcome::NoPayload);
        };

        let payload = match decode_payload(&po.content) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic, error = %e, "failed to decode payload object");
                return Ok(Outcome::DecodeFailed);
            }
        };

        let normalized = match self.normalizer.normalize(topic, &payload) {
            Ok(normalized) => normalized,
            Err(e @ NormalizeError::TypeCoercion { .. })
                if self.normalizer.coercion_policy() == CoercionPolicy::Abort =>
            {
                error!(topic, error = %e, "unconvertible field, aborting");
                return Err(e.into());
            }
            Err(e) => {
                warn!(topic, error = %e, "skipping record");
                return Ok(Outcome::Rejected(e));
            }
        };

        if !normalized.skipped_fields.is_empty() {
            warn!(topic, fields = ?normalized.skipped_fields, "skipped unconvertible fields");
        }
        if normalized.missing_timestamp {
            self.stats.zero_timestamps += 1;
            warn!(topic, "payload has no time field, using timestamp 0");
        }
        if normalized.record.fields().is_empty() {
            debug!(topic, "record has no fields, skipping");
            return Ok(Outcome::Empty);
        }

        if self.queue.try_enqueue(normalized.record) {
            Ok(Outcome::Enqueued)
        } else {
            warn!(
                topic,
                depth = self.queue.depth().get(),
                "dropping data, queue backlogged"
            );
            Ok(Outcome::Dropped)
        }
    }

    /// Receive and handle messages until `stop` is cancelled.
    ///
    /// Bus errors are logged and retried after a short pause. Returns the
    /// final counters, or the error that aborted the loop.
    pub async fn run<S>(
        mut self,
        subscriber: &S,
        stop: CancellationToken,
    ) -> Result<AdapterStats, IngestError>
    where
        S: EventSubscriber + ?Sized,
    {
        info!(po_type = %self.payload_type, "subscription adapter started");
        loop {
            let received = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                received = subscriber.recv() => received,
            };

            match received {
                Ok(message) => {
                    self.handle(&message)?;
                }
                Err(e) => {
                    warn!(error = %e, "bus receive failed");
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(RECV_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!(
            received = self.stats.received,
            enqueued = self.stats.enqueued,
            dropped = self.stats.dropped,
            skipped = self.stats.skipped(),
            "subscription adapter stopped"
        );
        Ok(self.stats)
    }
}
