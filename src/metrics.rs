use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Pipeline counters, registered on the gateway's registry.
pub struct AppMetrics {
    pub messages_received: IntCounter,
    pub parse_errors: IntCounter,
    pub events_routed: IntCounterVec,
    pub alerts_raised: IntCounterVec,
    pub alert_publish_failures: IntCounter,
    pub points_written: IntCounter,
    pub storage_write_failures: IntCounter,
}

impl AppMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let messages_received = IntCounter::new(
            "gateway_messages_received_total",
            "Number of messages delivered by the transport",
        )?;
        let parse_errors = IntCounter::new(
            "gateway_parse_errors_total",
            "Number of messages dropped because they could not be parsed",
        )?;
        let events_routed = IntCounterVec::new(
            Opts::new("gateway_events_routed_total", "Number of telemetry events routed"),
            &["entity_type"],
        )?;
        let alerts_raised = IntCounterVec::new(
            Opts::new("gateway_alerts_raised_total", "Number of alerts raised"),
            &["alert_type"],
        )?;
        let alert_publish_failures = IntCounter::new(
            "gateway_alert_publish_failures_total",
            "Number of alerts the alert sink rejected",
        )?;
        let points_written = IntCounter::new(
            "gateway_points_written_total",
            "Number of points accepted by the storage sink",
        )?;
        let storage_write_failures = IntCounter::new(
            "gateway_storage_write_failures_total",
            "Number of points the storage sink rejected",
        )?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(parse_errors.clone()))?;
        registry.register(Box::new(events_routed.clone()))?;
        registry.register(Box::new(alerts_raised.clone()))?;
        registry.register(Box::new(alert_publish_failures.clone()))?;
        registry.register(Box::new(points_written.clone()))?;
        registry.register(Box::new(storage_write_failures.clone()))?;

        Ok(Self {
            messages_received,
            parse_errors,
            events_routed,
            alerts_raised,
            alert_publish_failures,
            points_written,
            storage_write_failures,
        })
    }
}

/// Renders a registry in the Prometheus text format.
pub fn render(registry: &Registry) -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
