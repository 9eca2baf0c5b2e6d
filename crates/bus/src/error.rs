use thiserror::Error;

/// Errors that can occur in the bus layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("malformed bus message: {0}")]
    Framing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
