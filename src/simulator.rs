//! Synthetic publishers for patient vitals and robot status.
//!
//! Publishes on `<root>/<org>/<location>/<id>/{patients|robots}/data`, the
//! shape the gateway subscribes to.

use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use rumqttc::{AsyncClient, QoS};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::config::{GatewayCfg, SimulatorCfg};
use crate::ingest::schema::{DeviceSchema, PATIENT, ROBOT};
use crate::mqtt;

const TASKS: &[&str] = &[
    "patient_assistance",
    "medication_delivery",
    "room_cleaning",
    "vital_signs_check",
];
const ERROR_CODES: &[&str] = &["E001", "E002", "E003", "E004"];
const NO_ERROR_PROBABILITY: f64 = 0.9;

fn iso(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn patient_reading<R: Rng + ?Sized>(rng: &mut R, patient_id: &str, now: OffsetDateTime) -> Value {
    json!({
        "timestamp": iso(now),
        "patientId": patient_id,
        "data": {
            "heartRate": rng.random_range(60..=100),
            "bloodPressure": {
                "systolic": rng.random_range(100..=140),
                "diastolic": rng.random_range(60..=90),
            },
            "temperature": round_to(rng.random_range(36.1..=37.5), 1),
            "respiratoryRate": rng.random_range(12..=20),
            "oxygenSaturation": rng.random_range(95..=100),
        }
    })
}

pub fn robot_reading<R: Rng + ?Sized>(rng: &mut R, robot_id: &str, now: OffsetDateTime) -> Value {
    let error_code = if rng.random_bool(NO_ERROR_PROBABILITY) {
        None
    } else {
        ERROR_CODES.choose(rng).copied()
    };
    let last_maintenance = now - time::Duration::days(rng.random_range(0..=30));

    json!({
        "timestamp": iso(now),
        "robotId": robot_id,
        "data": {
            "position": {
                "x": round_to(rng.random_range(0.0..=50.0), 2),
                "y": round_to(rng.random_range(0.0..=30.0), 2),
                "z": 0,
            },
            "batteryLevel": rng.random_range(0..=100),
            "currentTask": TASKS.choose(rng).copied().unwrap_or("patient_assistance"),
            "errorCode": error_code,
            "lastMaintenance": iso(last_maintenance),
        }
    })
}

pub fn topic_for(root: &str, sim: &SimulatorCfg, schema: &DeviceSchema, entity_id: &str) -> String {
    format!(
        "{root}/{}/{}/{entity_id}/{}/data",
        sim.organization, sim.location, schema.topic_segment
    )
}

/// Queues one reading. A full queue drops the reading so the loop keeps
/// answering Ctrl-C while the broker is away.
fn publish(client: &AsyncClient, topic: &str, reading: Value) -> bool {
    let payload = reading.to_string();
    match client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
        Ok(()) => {
            debug!(topic = %topic, "reading queued");
            true
        }
        Err(e) => {
            error!(topic = %topic, error = %e, "failed to publish reading");
            false
        }
    }
}

/// Publishes readings on the configured intervals until Ctrl-C.
pub async fn run(cfg: GatewayCfg) -> anyhow::Result<()> {
    let sim = cfg.simulator.clone();
    let mut mqtt_cfg = cfg.mqtt.clone();
    mqtt_cfg.client_id = format!("{}-sim", mqtt_cfg.client_id);
    let root = mqtt_cfg.topic_root.clone();

    let (client, mut eventloop) = mqtt::connect(&mqtt_cfg);
    let retry = Duration::from_millis(mqtt_cfg.reconnect_delay_ms);
    let driver = tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!(error = %e, "mqtt connection error");
                tokio::time::sleep(retry).await;
            }
        }
    });

    let patient_topic = topic_for(&root, &sim, &PATIENT, &sim.patient_id);
    let robot_topic = topic_for(&root, &sim, &ROBOT, &sim.robot_id);
    let mut patient_tick = tokio::time::interval(Duration::from_secs(sim.patient_interval_secs.max(1)));
    let mut robot_tick = tokio::time::interval(Duration::from_secs(sim.robot_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(patient = %patient_topic, robot = %robot_topic, "simulator started");
    loop {
        tokio::select! {
            _ = patient_tick.tick() => {
                let reading = patient_reading(&mut rand::rng(), &sim.patient_id, OffsetDateTime::now_utc());
                publish(&client, &patient_topic, reading);
            }
            _ = robot_tick.tick() => {
                let reading = robot_reading(&mut rand::rng(), &sim.robot_id, OffsetDateTime::now_utc());
                publish(&client, &robot_topic, reading);
            }
            _ = &mut shutdown => break,
        }
    }

    info!("simulator stopped");
    mqtt::disconnect(&client);
    driver.abort();
    Ok(())
}
