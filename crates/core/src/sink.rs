use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::InsertRecord;

/// Destination store for normalized points.
///
/// Each call writes exactly one point (series, empty tag set, fields,
/// timestamp) and reports success or failure for that point alone.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write_point(&self, record: &InsertRecord) -> Result<(), SinkError>;
}

/// Blanket implementation so `Arc<dyn PointSink>` can be used directly.
#[async_trait]
impl<T: PointSink + ?Sized> PointSink for Arc<T> {
    async fn write_point(&self, record: &InsertRecord) -> Result<(), SinkError> {
        (**self).write_point(record).await
    }
}
