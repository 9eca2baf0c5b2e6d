pub mod config;
pub mod error;
pub mod record;
pub mod sink;

pub use config::{
    BridgeConfig, BusConfig, CoercionPolicy, InfluxConfig, MissingTimestampPolicy, PipelineConfig,
    WriteFailurePolicy,
};
pub use error::*;
pub use record::InsertRecord;
pub use sink::PointSink;
