use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure reported by a [`PointSink`](crate::PointSink) for a single write.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("store rejected write with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot encode point: {0}")]
    Encode(String),
}
