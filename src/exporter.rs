// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Telemetry exporter: periodically scrapes registry status, blob store
//! sizes, and task health into gauges, and serves them over HTTP.

use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::metrics::Metrics;
use crate::registry::RegistryClient;

/// Build the exporter's HTTP surface: `/metrics` and `/healthz`.
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn handle_metrics(State(metrics): State<Metrics>) -> Result<String, AppError> {
    metrics.export()
}

async fn handle_healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Refresh every telemetry gauge family from the registry once.
pub async fn scrape_once(client: &RegistryClient, metrics: &Metrics) -> Result<(), AppError> {
    let repositories = client.repositories().await?;
    metrics.record_repositories(&repositories);

    let blobstores = client.blobstores().await?;
    metrics.record_blobstores(&blobstores);

    let tasks = client.tasks().await?;
    metrics.record_tasks(&tasks);

    tracing::debug!(
        repositories = repositories.len(),
        blobstores = blobstores.len(),
        tasks = tasks.len(),
        "telemetry refreshed"
    );

    Ok(())
}

/// Run the scrape loop in the background. A failed scrape is logged and
/// counted; stale gauge values stay in place until the next tick succeeds.
pub fn spawn_scraper(client: RegistryClient, metrics: Metrics, interval: Duration) {
    if interval.is_zero() {
        tracing::warn!("scrape interval disabled; telemetry will not refresh");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let timer = metrics.scrape_duration.start_timer();
            if let Err(error) = scrape_once(&client, &metrics).await {
                metrics.scrape_failures.inc();
                tracing::warn!(%error, "telemetry scrape failed");
            }
            timer.observe_duration();
        }
    });
}
