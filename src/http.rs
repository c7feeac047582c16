use std::future::Future;
use std::time::Duration;

use axum::extract::State;
use axum::http::{self, Response, StatusCode};
use axum::{response::IntoResponse, routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::app::AppState;
use crate::metrics;

/// Serves health, readiness and metrics until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (prom_layer, prom_handle) = PrometheusMetricLayer::pair();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/metrics",
            get(move |State(st): State<AppState>| {
                let prom_handle = prom_handle.clone();
                async move {
                    let mut body = prom_handle.render();
                    body.push_str(&metrics::render(&st.registry));
                    body
                }
            }),
        )
        .with_state(state)
        .layer(prom_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &http::Request<_>| {
                    tracing::info_span!(
                      "http_request",
                      method = %req.method(),
                      path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::debug!(
                      status = %res.status(),
                      latency_ms = %latency.as_millis(),
                      "response"
                    )
                })
                .on_failure(|_error: _, latency: Duration, _span: &Span| {
                    tracing::warn!(latency_ms = %latency.as_millis(), "request_failed");
                }),
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn readyz(State(st): State<AppState>) -> impl IntoResponse {
    if st.ready.is_ready(&st.cfg.health) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
