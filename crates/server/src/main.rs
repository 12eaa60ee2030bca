//! image-resize server entry point.
//!
//! Loads configuration once, opens both stores, starts the background task
//! worker and the eviction daemon, then serves HTTP until ctrl-c.
//! Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use resizer_client::{FetchClient, FetchConfig, FormatEncoder};
use resizer_core::{AppConfig, CacheDb, EvictionDaemon, RefererDb};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod app;
mod error;
mod pipeline;
mod routes;
mod tasks;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        port = config.port,
        quality = config.quality,
        max_db_size_mb = config.max_db_size,
        "starting image-resize server"
    );

    let cache = CacheDb::open(&config.cache_db_path)
        .await
        .context("opening image cache")?
        .with_retry(config.retry_policy());
    let referers = RefererDb::open(&config.referer_db_path)
        .await
        .context("opening referer database")?
        .with_retry(config.retry_policy());

    let shutdown = CancellationToken::new();
    let (tasks, worker) = tasks::TaskQueue::spawn(config.task_queue_capacity, shutdown.clone());

    let store = cache.clone();
    let daemon = EvictionDaemon::new(cache.clone(), config.max_db_size_bytes())
        .with_check_interval(config.eviction_interval());
    let eviction = tokio::spawn(daemon.run(shutdown.clone()));

    let fetcher = FetchClient::new(FetchConfig::from(&config))?;
    let encoder = FormatEncoder::avif(config.quality, config.encoder_speed);
    let service =
        pipeline::ResizeService::new(cache.clone(), referers.clone(), Arc::new(fetcher), encoder, tasks.clone())
            .with_limits(&config);

    let bind_addr = config.bind_addr();
    let state = app::AppState { service: Arc::new(service), cache, referers, config: Arc::new(config) };
    let router = app::build_router(state);

    let listener =
        tokio::net::TcpListener::bind(&bind_addr).await.with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
        })
        .await?;

    // Let queued cache writes land before the worker stops.
    tasks.flush().await;
    shutdown.cancel();
    if let Err(err) = worker.await {
        tracing::warn!(error = %err, "task worker ended abnormally");
    }
    if let Err(err) = eviction.await {
        tracing::warn!(error = %err, "eviction daemon ended abnormally");
    }
    if let Err(err) = store.close().await {
        tracing::warn!(error = %err, "closing image cache failed");
    }

    tracing::info!("server stopped");
    Ok(())
}
