use std::sync::Arc;

use tracing::{debug, warn};

use crate::fanout::{FanoutReport, FanoutSink};
use crate::ingest::router::route;
use crate::ingest::types::InboundMessage;
use crate::metrics::AppMetrics;

/// Handles one inbound message end to end: route it, then fan it out.
///
/// Messages that fail to parse are logged and dropped.
pub struct MessageHandler {
    fanout: FanoutSink,
    metrics: Arc<AppMetrics>,
}

impl MessageHandler {
    pub fn new(fanout: FanoutSink, metrics: Arc<AppMetrics>) -> Self {
        Self { fanout, metrics }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Option<FanoutReport> {
        self.metrics.messages_received.inc();

        let event = match route(&msg.topic, &msg.payload) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.parse_errors.inc();
                warn!(topic = %msg.topic, error = %e, "dropping message");
                return None;
            }
        };

        self.metrics
            .events_routed
            .with_label_values(&[event.entity_type.as_str()])
            .inc();
        let entity_id = event.entity_id.clone();
        let report = self.fanout.dispatch(event).await;
        debug!(
            topic = %msg.topic,
            entity_id = %entity_id,
            stored = report.stored,
            alerts = report.alerts_raised,
            "handled"
        );
        Some(report)
    }
}
