use thiserror::Error;

use bridge_bus::BusError;
use bridge_core::{CoreError, SinkError};

/// Why a payload could not become an insert record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("cannot coerce field {key:?} of type {kind} to a float")]
    TypeCoercion { key: String, kind: &'static str },

    #[error("payload has no `time` field")]
    MissingTimestamp,
}

/// Why a payload object's content could not be read as a field map.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid MessagePack: {0}")]
    Decode(#[from] rmpv::decode::Error),

    #[error("payload is {0}, expected a map")]
    NotAMap(&'static str),

    #[error("payload map has a non-string key")]
    NonStringKey,
}

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("config error: {0}")]
    Config(#[from] CoreError),

    #[error("invalid series pattern: {0}")]
    SeriesPattern(#[from] regex::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
