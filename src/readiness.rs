use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{HealthCfg, StorageCfg};
use crate::storage;

pub struct Readiness {
    pub mqtt_ok: AtomicBool,
    pub storage_ok: AtomicBool,
    draining: AtomicBool,
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            mqtt_ok: AtomicBool::new(false),
            storage_ok: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self, health: &HealthCfg) -> bool {
        if self.draining.load(Ordering::Relaxed) {
            return false;
        }
        let mqtt = !health.require_mqtt || self.mqtt_ok.load(Ordering::Relaxed);
        let storage = !health.require_storage || self.storage_ok.load(Ordering::Relaxed);
        mqtt && storage
    }

    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically checks the store's health endpoint. The MQTT flag is kept
/// current by the transport event loop instead.
pub fn start_readiness_probes(health: &HealthCfg, storage_cfg: &StorageCfg, ready: Arc<Readiness>) {
    if !storage_cfg.enabled {
        return;
    }
    let interval = Duration::from_millis(health.probe_interval_ms.max(100));
    let base_url = storage_cfg.url.clone();

    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(interval).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "storage probe disabled");
                return;
            }
        };
        loop {
            let ok = storage::probe(&client, &base_url).await;
            if ok != ready.storage_ok.swap(ok, Ordering::Relaxed) {
                debug!(storage_ok = ok, "storage readiness changed");
            }
            tokio::time::sleep(interval).await;
        }
    });
}
