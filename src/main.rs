mod cleaner;
mod config;
mod error;
mod exporter;
mod grouping;
mod metrics;
mod model;
mod registry;
mod retention;
mod rules;
mod sink;

use std::sync::Arc;

use cleaner::{clean_repository, CleanReport};
use config::{PolicyFile, Settings};
use metrics::Metrics;
use registry::RegistryClient;
use sink::{DeletionSink, DryRunSink, RegistrySink};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    let metrics = Metrics::new()?;
    let client = RegistryClient::try_new(
        &settings.base_url,
        settings.username.clone(),
        settings.password.clone(),
        settings.request_timeout,
    )?;

    let mode = std::env::args().nth(1).unwrap_or_else(|| "clean".to_string());
    match mode.as_str() {
        "clean" => run_clean(&settings, client, metrics).await,
        "export" => run_export(&settings, client, metrics).await,
        other => anyhow::bail!("unknown mode '{other}', expected 'clean' or 'export'"),
    }
}

async fn run_clean(settings: &Settings, client: RegistryClient, metrics: Metrics) -> anyhow::Result<()> {
    let policy = PolicyFile::load(&settings.policy_path)?;
    let rules = policy.compile()?;

    if policy.repositories.is_empty() {
        tracing::warn!("no repositories configured; nothing to clean");
        return Ok(());
    }

    let sink: Arc<dyn DeletionSink> = if policy.dry_run {
        tracing::info!("dry-run enabled; deletions will be logged only");
        Arc::new(DryRunSink)
    } else {
        Arc::new(RegistrySink::new(client.clone()))
    };

    let mut totals = CleanReport::default();
    for repository in &policy.repositories {
        match clean_repository(&client, sink.as_ref(), &rules, &metrics, repository).await {
            Ok(report) => totals.merge(&report),
            Err(error) => {
                tracing::error!(repository = %repository, %error, "repository cleanup failed");
            }
        }
    }

    tracing::info!(
        scanned = totals.scanned,
        deleted = totals.deleted,
        failed = totals.failed,
        "cleanup finished"
    );

    Ok(())
}

async fn run_export(settings: &Settings, client: RegistryClient, metrics: Metrics) -> anyhow::Result<()> {
    exporter::spawn_scraper(client, metrics.clone(), settings.scrape_interval);

    let app = exporter::router(metrics);
    let listen_addr = settings.listen_addr;
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tracing::info!(%listen_addr, "starting telemetry exporter");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("exporter exited cleanly");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => term_signal.recv().await,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                None
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
