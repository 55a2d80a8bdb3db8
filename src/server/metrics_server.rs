// src/server/metrics_server.rs

//! A small HTTP endpoint for monitoring the bridge.
//!
//! `/metrics` serves the Prometheus text format, `/status` the same report a
//! status query prints, and `/health` answers 200 while the link is up and
//! 503 while it is down.

use crate::core::metrics::{self, gather_metrics};
use crate::core::state::BridgeState;
use axum::extract::State;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

async fn metrics_handler(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    // The connected gauge is sampled, so refresh it before encoding.
    let connected = state.connection.is_connected();
    metrics::CONNECTED.set(if connected { 1.0 } else { 0.0 });

    (
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        gather_metrics(),
    )
}

async fn status_handler(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    (StatusCode::OK, state.status().to_string())
}

async fn health_handler(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    if state.connection.is_connected() {
        (StatusCode::OK, "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
    }
}

pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves the monitoring endpoints until `shutdown_rx` fires.
pub async fn run_metrics_server(state: Arc<BridgeState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Could not bind the metrics endpoint to {}: {}", addr, e);
            return;
        }
    };
    info!("Monitoring endpoints available at http://{} (/metrics, /status, /health).", addr);

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics endpoint shutting down.");
        })
        .await;
    if let Err(e) = served {
        error!("Metrics endpoint stopped with an error: {}", e);
    }
}
