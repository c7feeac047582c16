use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::Alert;
use crate::storage::Point;

/// Per-call failure of a best-effort sink. Never fatal to the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("storage write failed: {0}")]
    StorageWrite(String),
}

/// Receives alerts as they are raised.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<(), SinkError>;
}

/// Receives one time-series point per routed event.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write(&self, point: &Point) -> Result<(), SinkError>;
}

/// Sink that only logs. Stands in for storage when it is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn publish(&self, alert: &Alert) -> Result<(), SinkError> {
        info!(
            entity_type = %alert.entity_type,
            entity_id = %alert.entity_id,
            alert_type = %alert.alert_type,
            value = %alert.observed_value,
            "alert"
        );
        Ok(())
    }
}

#[async_trait]
impl PointSink for LogSink {
    async fn write(&self, point: &Point) -> Result<(), SinkError> {
        debug!(measurement = point.measurement, fields = point.fields.len(), "point discarded");
        Ok(())
    }
}
