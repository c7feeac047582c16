use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::GatewayCfg;
use crate::dispatcher::Dispatcher;
use crate::fanout::FanoutSink;
use crate::ingest::MessageHandler;
use crate::metrics::AppMetrics;
use crate::mqtt::{self, MqttAlertSink};
use crate::readiness::{start_readiness_probes, Readiness};
use crate::sink::{LogSink, PointSink};
use crate::storage::InfluxSink;

const DISCONNECT_FLUSH: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<GatewayCfg>,
    pub ready: Arc<Readiness>,
    pub registry: Registry,
    pub metrics: Arc<AppMetrics>,
}

/// Runs the gateway until SIGTERM or Ctrl-C.
pub async fn run(cfg: GatewayCfg) -> anyhow::Result<()> {
    let cfg = Arc::new(cfg);
    let rules = Arc::new(cfg.rule_set()?);
    let registry = Registry::new();
    let metrics = Arc::new(AppMetrics::new(&registry)?);
    let ready = Arc::new(Readiness::new());

    let points: Arc<dyn PointSink> = if cfg.storage.enabled {
        Arc::new(InfluxSink::new(&cfg.storage)?)
    } else {
        info!("storage disabled, points will be discarded");
        Arc::new(LogSink)
    };

    let (client, eventloop) = mqtt::connect(&cfg.mqtt);
    let alerts = Arc::new(MqttAlertSink::new(client.clone(), cfg.mqtt.alert_topic.clone()));

    let (tx, rx) = mpsc::channel(cfg.ingest.queue_capacity);
    let fanout = FanoutSink::new(rules.clone(), alerts, points, metrics.clone());
    let handler = Arc::new(MessageHandler::new(fanout, metrics.clone()));
    let dispatcher = tokio::spawn(Dispatcher::new(rx, handler).run());
    let mut transport = tokio::spawn(mqtt::run_subscriber(
        client.clone(),
        eventloop,
        cfg.mqtt.clone(),
        tx,
        ready.clone(),
    ));
    start_readiness_probes(&cfg.health, &cfg.storage, ready.clone());
    info!(rules = rules.len(), "pipeline started");

    let state = AppState {
        cfg: cfg.clone(),
        ready: ready.clone(),
        registry,
        metrics,
    };
    let listener = TcpListener::bind(cfg.http.bind).await?;
    println!("listening on {}", listener.local_addr()?);

    let grace = Duration::from_millis(cfg.health.drain_grace_ms);
    let drain = {
        let ready = ready.clone();
        async move {
            shutdown_signal().await;
            ready.begin_drain();
            info!(grace_ms = grace.as_millis() as u64, "draining");
            tokio::time::sleep(grace).await;
        }
    };
    crate::http::serve(listener, state, drain).await?;

    // the transport gets a short window to flush the disconnect; dropping it
    // closes the inbound channel and lets the dispatcher finish
    if mqtt::disconnect(&client) {
        let _ = tokio::time::timeout(DISCONNECT_FLUSH, &mut transport).await;
    }
    transport.abort();
    let _ = dispatcher.await;
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
