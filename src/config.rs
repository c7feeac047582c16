use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::rules::{RuleSet, ThresholdRule};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub mqtt: MqttCfg,
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub health: HealthCfg,
    #[serde(default)]
    pub ingest: IngestCfg,
    #[serde(default)]
    pub log: LogCfg,
    /// Replaces the default threshold table when present.
    #[serde(default)]
    pub rules: Option<Vec<ThresholdRule>>,
    #[serde(default)]
    pub simulator: SimulatorCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HttpCfg {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct MqttCfg {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_root: String,
    pub alert_topic: String,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
    pub reconnect_delay_ms: u64,
}
impl Default for MqttCfg {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "gw-1".into(),
            username: None,
            password: None,
            topic_root: "hospital".into(),
            alert_topic: "hospital/alerts".into(),
            keep_alive_secs: 60,
            channel_capacity: 64,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct StorageCfg {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub timeout_ms: u64,
}
impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8086".into(),
            token: String::new(),
            org: "hospital".into(),
            bucket: "healthcare_data".into(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCfg {
    pub require_mqtt: bool,
    pub require_storage: bool,
    pub probe_interval_ms: u64,
    /// How long `/readyz` reports 503 before the server stops on shutdown.
    pub drain_grace_ms: u64,
}
impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            require_mqtt: false,
            require_storage: false,
            probe_interval_ms: 5000,
            drain_grace_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestCfg {
    pub queue_capacity: usize,
}
impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            queue_capacity: 10000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LogCfg {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SimulatorCfg {
    pub organization: String,
    pub location: String,
    pub patient_id: String,
    pub robot_id: String,
    pub patient_interval_secs: u64,
    pub robot_interval_secs: u64,
}
impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            organization: "hospitalA".into(),
            location: "ward5".into(),
            patient_id: "patient001".into(),
            robot_id: "robot001".into(),
            patient_interval_secs: 5,
            robot_interval_secs: 10,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl GatewayCfg {
    pub fn load(path: Option<String>) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.mqtt.host.is_empty(), "mqtt.host cannot be empty");
        anyhow::ensure!(!self.mqtt.alert_topic.is_empty(), "mqtt.alert_topic cannot be empty");
        anyhow::ensure!(!self.mqtt.topic_root.is_empty(), "mqtt.topic_root cannot be empty");
        anyhow::ensure!(self.ingest.queue_capacity > 0, "ingest.queue_capacity must be positive");
        self.rule_set()?;
        Ok(())
    }

    pub fn rule_set(&self) -> anyhow::Result<RuleSet> {
        Ok(RuleSet::from_config(self.rules.clone())?)
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(path: Option<String>) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder()
        .add_source(File::with_name("gateway").required(false))
        .add_source(Environment::with_prefix("GATEWAY").separator("__"));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(&path));
    }
    Ok(builder.build()?)
}
