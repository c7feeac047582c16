//! MQTT transport: the inbound subscription loop and the alert publisher.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttCfg;
use crate::domain::Alert;
use crate::ingest::schema::{topic_filter, SCHEMAS};
use crate::ingest::InboundMessage;
use crate::readiness::Readiness;
use crate::sink::{AlertSink, SinkError};

pub fn connect(cfg: &MqttCfg) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user, pass);
    }
    AsyncClient::new(opts, cfg.channel_capacity.max(1))
}

/// Subscription filters for every known device schema.
pub fn subscriptions(topic_root: &str) -> Vec<String> {
    SCHEMAS.iter().map(|s| topic_filter(topic_root, s)).collect()
}

/// Drives the MQTT event loop and feeds publishes into `tx`.
///
/// Subscriptions are (re)issued on every ConnAck. Connection errors are
/// retried after `reconnect_delay_ms`. Returns once `tx` is closed.
pub async fn run_subscriber(
    client: AsyncClient,
    mut eventloop: EventLoop,
    cfg: MqttCfg,
    tx: mpsc::Sender<InboundMessage>,
    ready: Arc<Readiness>,
) {
    let filters = subscriptions(&cfg.topic_root);
    let delay = Duration::from_millis(cfg.reconnect_delay_ms);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                ready.mqtt_ok.store(true, Ordering::Relaxed);
                info!(host = %cfg.host, port = cfg.port, "connected to broker");
                for filter in &filters {
                    match client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => info!(filter = %filter, "subscribed"),
                        Err(e) => warn!(filter = %filter, error = %e, "subscribe failed"),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if tx.send(msg).await.is_err() {
                    debug!("inbound channel closed, stopping subscriber");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                ready.mqtt_ok.store(false, Ordering::Relaxed);
                warn!(error = %e, retry_ms = cfg.reconnect_delay_ms, "mqtt connection error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Queues a clean disconnect without waiting for room in the request queue.
///
/// Returns false when the queue is full or the event loop is gone; the broker
/// then sees the socket close instead.
pub fn disconnect(client: &AsyncClient) -> bool {
    match client.try_disconnect() {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "disconnect not queued");
            false
        }
    }
}

/// Publishes alerts as JSON at QoS 1.
///
/// Uses the non-blocking client call: when the outgoing queue is full (broker
/// unreachable) the alert is reported as failed instead of stalling the
/// pipeline.
pub struct MqttAlertSink {
    client: AsyncClient,
    topic: String,
}

impl MqttAlertSink {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }
}

#[async_trait]
impl AlertSink for MqttAlertSink {
    async fn publish(&self, alert: &Alert) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(alert).map_err(|e| SinkError::Publish(e.to_string()))?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| SinkError::Publish(e.to_string()))?;
        info!(
            topic = %self.topic,
            entity_id = %alert.entity_id,
            alert_type = %alert.alert_type,
            value = %alert.observed_value,
            "alert published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityType, FieldValue};

    #[test]
    fn subscribes_to_both_device_classes() {
        assert_eq!(
            subscriptions("hospital"),
            ["hospital/+/+/+/patients/data", "hospital/+/+/+/robots/data"]
        );
    }

    fn alert() -> Alert {
        Alert {
            timestamp: "2024-05-20T12:00:00Z".into(),
            entity_type: EntityType::Patient,
            entity_id: "patient001".into(),
            alert_type: "Abnormal Heart Rate".into(),
            observed_value: FieldValue::Int(45),
        }
    }

    #[tokio::test]
    async fn full_outgoing_queue_fails_instead_of_blocking() {
        let cfg = MqttCfg {
            channel_capacity: 1,
            ..MqttCfg::default()
        };
        // the event loop is never polled, so nothing drains the queue
        let (client, _eventloop) = connect(&cfg);
        let sink = MqttAlertSink::new(client, "hospital/alerts".into());

        sink.publish(&alert()).await.unwrap();
        assert!(matches!(
            sink.publish(&alert()).await,
            Err(SinkError::Publish(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_returns_when_queue_is_full() {
        let cfg = MqttCfg {
            channel_capacity: 1,
            ..MqttCfg::default()
        };
        let (client, eventloop) = connect(&cfg);
        let sink = MqttAlertSink::new(client.clone(), "hospital/alerts".into());
        sink.publish(&alert()).await.unwrap();

        let queued = tokio::time::timeout(Duration::from_secs(1), async { disconnect(&client) })
            .await
            .expect("disconnect must not wait for the event loop");
        assert!(!queued);

        drop(eventloop);
        assert!(!disconnect(&client));
    }
}
