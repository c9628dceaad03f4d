// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for cleanup runs and registry telemetry.
//!
//! The registry object is constructed explicitly in `main` and passed where
//! needed; nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntGaugeVec, Opts, Registry,
};

use crate::error::AppError;
use crate::model::{BlobStoreInfo, RepositoryInfo, TaskInfo};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Cleanup metrics
    pub components_scanned: IntCounter,
    pub components_deleted: IntCounter,
    pub delete_failures: IntCounter,
    pub clean_duration: Histogram,

    // Telemetry gauges
    pub repo_status: IntGaugeVec,
    pub repo_count: IntGaugeVec,
    pub blob_used_bytes: IntGaugeVec,
    pub blob_available_bytes: IntGaugeVec,
    pub blob_count: IntGaugeVec,
    pub task_status: IntGaugeVec,

    // Scrape health
    pub scrape_failures: IntCounter,
    pub scrape_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let components_scanned = IntCounter::with_opts(Opts::new(
            "janitor_components_scanned_total",
            "Total number of components fetched from the registry",
        ))
        .map_err(metric_error)?;

        let components_deleted = IntCounter::with_opts(Opts::new(
            "janitor_components_deleted_total",
            "Total number of components handed to the deletion sink",
        ))
        .map_err(metric_error)?;

        let delete_failures = IntCounter::with_opts(Opts::new(
            "janitor_delete_failures_total",
            "Total number of deletions the sink reported as failed",
        ))
        .map_err(metric_error)?;

        let clean_duration = Histogram::with_opts(
            HistogramOpts::new(
                "janitor_clean_duration_seconds",
                "Duration of one repository cleanup pass in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        )
        .map_err(metric_error)?;

        let repo_status = IntGaugeVec::new(
            Opts::new("janitor_repo_status", "Repository presence in the registry listing"),
            &["name", "format", "type"],
        )
        .map_err(metric_error)?;

        let repo_count = IntGaugeVec::new(
            Opts::new("janitor_repo_count", "Number of repositories by type"),
            &["type"],
        )
        .map_err(metric_error)?;

        let blob_used_bytes = IntGaugeVec::new(
            Opts::new("janitor_blob_used_bytes", "Used space per blob store"),
            &["name", "type"],
        )
        .map_err(metric_error)?;

        let blob_available_bytes = IntGaugeVec::new(
            Opts::new("janitor_blob_available_bytes", "Available space per blob store"),
            &["name", "type"],
        )
        .map_err(metric_error)?;

        let blob_count = IntGaugeVec::new(
            Opts::new("janitor_blob_count", "Number of blobs per blob store"),
            &["name", "type"],
        )
        .map_err(metric_error)?;

        let task_status = IntGaugeVec::new(
            Opts::new(
                "janitor_task_status",
                "Registry task health: 0 ok, 1 error, -1 never ran",
            ),
            &["id", "name", "type", "state"],
        )
        .map_err(metric_error)?;

        let scrape_failures = IntCounter::with_opts(Opts::new(
            "janitor_scrape_failures_total",
            "Total number of telemetry scrapes that failed",
        ))
        .map_err(metric_error)?;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "janitor_scrape_duration_seconds",
                "Duration of one telemetry scrape in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .map_err(metric_error)?;

        register(&registry, Box::new(components_scanned.clone()))?;
        register(&registry, Box::new(components_deleted.clone()))?;
        register(&registry, Box::new(delete_failures.clone()))?;
        register(&registry, Box::new(clean_duration.clone()))?;
        register(&registry, Box::new(repo_status.clone()))?;
        register(&registry, Box::new(repo_count.clone()))?;
        register(&registry, Box::new(blob_used_bytes.clone()))?;
        register(&registry, Box::new(blob_available_bytes.clone()))?;
        register(&registry, Box::new(blob_count.clone()))?;
        register(&registry, Box::new(task_status.clone()))?;
        register(&registry, Box::new(scrape_failures.clone()))?;
        register(&registry, Box::new(scrape_duration.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            components_scanned,
            components_deleted,
            delete_failures,
            clean_duration,
            repo_status,
            repo_count,
            blob_used_bytes,
            blob_available_bytes,
            blob_count,
            task_status,
            scrape_failures,
            scrape_duration,
        })
    }

    /// Replace the repository gauges with a fresh listing.
    pub fn record_repositories(&self, repositories: &[RepositoryInfo]) {
        self.repo_status.reset();
        self.repo_count.reset();

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for repo in repositories {
            self.repo_status
                .with_label_values(&[repo.name.as_str(), repo.format.as_str(), repo.kind.as_str()])
                .set(1);
            *counts.entry(repo.kind.as_str()).or_insert(0) += 1;
        }

        for (kind, count) in counts {
            self.repo_count.with_label_values(&[kind]).set(count);
        }
    }

    /// Replace the blob store gauges with a fresh listing.
    pub fn record_blobstores(&self, blobstores: &[BlobStoreInfo]) {
        self.blob_used_bytes.reset();
        self.blob_available_bytes.reset();
        self.blob_count.reset();

        for store in blobstores {
            let labels = [store.name.as_str(), store.kind.as_str()];
            self.blob_used_bytes
                .with_label_values(&labels)
                .set(store.total_size_in_bytes);
            self.blob_available_bytes
                .with_label_values(&labels)
                .set(store.available_space_in_bytes);
            self.blob_count
                .with_label_values(&labels)
                .set(store.blob_count);
        }
    }

    /// Replace the task gauges with a fresh listing.
    pub fn record_tasks(&self, tasks: &[TaskInfo]) {
        self.task_status.reset();

        for task in tasks {
            let value = match task.last_run_result.as_deref() {
                Some("OK") => 0,
                Some(_) => 1,
                None => -1,
            };
            self.task_status
                .with_label_values(&[
                    task.id.as_str(),
                    task.name.as_str(),
                    task.kind.as_str(),
                    task.current_state.as_str(),
                ])
                .set(value);
        }
    }

    /// Export all metrics in the Prometheus text format.
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to convert metrics to string: {}", e)))
    }
}

fn register(registry: &Registry, collector: Box<dyn Collector>) -> Result<(), AppError> {
    registry
        .register(collector)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))
}

fn metric_error(error: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", error))
}
