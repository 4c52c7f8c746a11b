//! HTTP health and metrics endpoints for liveness/readiness probes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::store::Store;

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn Store>,
    pub metrics: PrometheusHandle,
    pub start_time: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    status: &'static str,
    chains: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn health_handler(Extension(state): Extension<HealthState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(HealthResponse {
            status: "ok",
            uptime_secs: state.start_time.elapsed().as_secs(),
        }),
    )
}

async fn ready_handler(Extension(state): Extension<HealthState>) -> impl IntoResponse {
    let chains = match state.store.begin().await {
        Ok(txn) => txn.chains().await.map(|c| c.len()),
        Err(err) => Err(err),
    };

    match chains {
        Ok(count) => (
            StatusCode::OK,
            axum::Json(ReadinessResponse {
                status: "ready",
                chains: count,
                error: None,
            }),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(ReadinessResponse {
                status: "not_ready",
                chains: 0,
                error: Some(err.to_string()),
            }),
        ),
    }
}

async fn metrics_handler(Extension(state): Extension<HealthState>) -> impl IntoResponse {
    state.metrics.render()
}

/// Serve `/health`, `/ready` and `/metrics` until cancellation.
pub async fn serve(port: u16, state: HealthState, token: CancellationToken) -> eyre::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "starting health server");

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state));

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .map_err(Into::into)
}
