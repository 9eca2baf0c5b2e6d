//! InfluxDB sink for the bridge.
//!
//! Each [`InsertRecord`](bridge_core::InsertRecord) becomes one line of
//! InfluxDB line protocol, written with its own HTTP request:
//!
//! ```text
//! InsertRecord --> line_protocol::encode_point --> POST /write?db=..&precision=ns
//! ```

pub mod client;
pub mod line_protocol;

pub use client::InfluxSink;
pub use line_protocol::encode_point;
