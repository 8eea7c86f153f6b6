use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use engine::{OrchestratorClient, RefreshPoller, Warehouse};
use serde::Serialize;

use crate::{reports, webhook};

#[derive(Clone)]
pub struct ServerState {
    pub warehouse: Warehouse,
    /// The single account this deployment ingests; webhook payloads for any
    /// other account are rejected.
    pub account_uid: String,
    /// Control-API client used to trigger the webhook pipeline. Absent when
    /// no orchestrator is configured; persistence still happens, the merge
    /// just waits for the next scheduled run.
    pub control: Option<Arc<OrchestratorClient>>,
    /// Debounced refresh poller backing `/reports/should-refresh`.
    pub poller: Option<Arc<RefreshPoller>>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "healthy" })
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/starling/feed-item", post(webhook::receive_feed_item))
        .route("/health", get(health))
        .route("/reports/spending", get(reports::spending))
        .route("/reports/trend", get(reports::trend))
        .route("/reports/top-counterparties", get(reports::top_counterparties))
        .route("/reports/balance", get(reports::balance))
        .route("/reports/should-refresh", get(reports::should_refresh))
        .with_state(state)
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Webhook server listening on {}", addr);
    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
