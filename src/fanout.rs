use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::TelemetryEvent;
use crate::evaluator::evaluate;
use crate::metrics::AppMetrics;
use crate::rules::RuleSet;
use crate::sink::{AlertSink, PointSink};
use crate::storage::Point;

/// What happened to one event on its way out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub stored: bool,
    pub alerts_raised: usize,
    pub alerts_published: usize,
}

/// Sends every routed event to storage and, through the evaluator, to the
/// alert sink. The two legs run concurrently and a failure in one does not
/// stop the other.
pub struct FanoutSink {
    rules: Arc<RuleSet>,
    alerts: Arc<dyn AlertSink>,
    points: Arc<dyn PointSink>,
    metrics: Arc<AppMetrics>,
}

impl FanoutSink {
    pub fn new(
        rules: Arc<RuleSet>,
        alerts: Arc<dyn AlertSink>,
        points: Arc<dyn PointSink>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            rules,
            alerts,
            points,
            metrics,
        }
    }

    pub async fn dispatch(&self, event: TelemetryEvent) -> FanoutReport {
        let (stored, (alerts_raised, alerts_published)) =
            tokio::join!(self.store(&event), self.raise_alerts(&event));
        FanoutReport {
            stored,
            alerts_raised,
            alerts_published,
        }
    }

    async fn store(&self, event: &TelemetryEvent) -> bool {
        let point = Point::from_event(event);
        match self.points.write(&point).await {
            Ok(()) => {
                self.metrics.points_written.inc();
                debug!(entity_id = %event.entity_id, measurement = point.measurement, "stored");
                true
            }
            Err(e) => {
                self.metrics.storage_write_failures.inc();
                warn!(entity_id = %event.entity_id, error = %e, "storage write failed");
                false
            }
        }
    }

    /// Publishes alerts one at a time so they leave in rule-table order.
    async fn raise_alerts(&self, event: &TelemetryEvent) -> (usize, usize) {
        let alerts = evaluate(&self.rules, event);
        let mut published = 0;
        for alert in &alerts {
            self.metrics
                .alerts_raised
                .with_label_values(&[alert.alert_type.as_str()])
                .inc();
            match self.alerts.publish(alert).await {
                Ok(()) => published += 1,
                Err(e) => {
                    self.metrics.alert_publish_failures.inc();
                    warn!(
                        entity_id = %alert.entity_id,
                        alert_type = %alert.alert_type,
                        error = %e,
                        "alert publish failed"
                    );
                }
            }
        }
        (alerts.len(), published)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Alert, EntityType, FieldValue};
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use prometheus::Registry;
    use std::sync::Mutex;
    use time::macros::datetime;

    /// In-memory sink that records what it receives, optionally failing.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub fail: bool,
        pub alerts: Mutex<Vec<Alert>>,
        pub points: Mutex<Vec<Point>>,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn publish(&self, alert: &Alert) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Publish("broker down".into()));
            }
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl PointSink for RecordingSink {
        async fn write(&self, point: &Point) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::StorageWrite("store down".into()));
            }
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }
    }

    pub(crate) fn metrics() -> Arc<AppMetrics> {
        Arc::new(AppMetrics::new(&Registry::new()).unwrap())
    }

    fn patient_event() -> TelemetryEvent {
        TelemetryEvent {
            entity_type: EntityType::Patient,
            entity_id: "patient001".into(),
            timestamp: datetime!(2024-05-20 12:00:00 UTC),
            source_timestamp: "2024-05-20T12:00:00Z".into(),
            fields: vec![
                ("heartRate".into(), FieldValue::Int(75)),
                ("temperature".into(), FieldValue::Float(40.0)),
                ("oxygenSaturation".into(), FieldValue::Int(90)),
            ],
        }
    }

    #[tokio::test]
    async fn every_event_reaches_both_sinks() {
        let alerts = Arc::new(RecordingSink::default());
        let points = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new(
            Arc::new(RuleSet::default()),
            alerts.clone(),
            points.clone(),
            metrics(),
        );

        let report = fanout.dispatch(patient_event()).await;
        assert_eq!(
            report,
            FanoutReport {
                stored: true,
                alerts_raised: 2,
                alerts_published: 2,
            }
        );

        let published: Vec<_> = alerts
            .alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.alert_type.clone())
            .collect();
        assert_eq!(published, ["Abnormal Temperature", "Low Oxygen Saturation"]);
        assert_eq!(points.points.lock().unwrap()[0].measurement, "patient_vitals");
    }

    #[tokio::test]
    async fn storage_failure_does_not_block_alerts() {
        let alerts = Arc::new(RecordingSink::default());
        let m = metrics();
        let fanout = FanoutSink::new(
            Arc::new(RuleSet::default()),
            alerts.clone(),
            Arc::new(RecordingSink::failing()),
            m.clone(),
        );

        let report = fanout.dispatch(patient_event()).await;
        assert!(!report.stored);
        assert_eq!(report.alerts_published, 2);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 2);
        assert_eq!(m.storage_write_failures.get(), 1);
    }

    #[tokio::test]
    async fn publish_failure_does_not_block_storage() {
        let points = Arc::new(RecordingSink::default());
        let m = metrics();
        let fanout = FanoutSink::new(
            Arc::new(RuleSet::default()),
            Arc::new(RecordingSink::failing()),
            points.clone(),
            m.clone(),
        );

        let report = fanout.dispatch(patient_event()).await;
        assert!(report.stored);
        assert_eq!(report.alerts_raised, 2);
        assert_eq!(report.alerts_published, 0);
        assert_eq!(points.points.lock().unwrap().len(), 1);
        assert_eq!(m.alert_publish_failures.get(), 2);
    }
}
