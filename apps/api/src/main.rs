mod config;
mod db;
mod errors;
mod intake;
mod llm_client;
mod models;
mod pipeline;
mod queue;
mod records;
mod routes;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::pipeline::render::PdfiumConverter;
use crate::pipeline::worker::Worker;
use crate::queue::{JobQueue, RedisJobQueue};
use crate::records::{AnalysisStore, PgAnalysisStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Resume Review API v{} (role: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.role
    );

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let records: Arc<dyn AnalysisStore> = Arc::new(PgAnalysisStore::new(db));

    // Initialize Redis queue
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let queue: Arc<dyn JobQueue> =
        Arc::new(RedisJobQueue::new(redis_client.clone(), config.queue_name.clone()));
    info!("Job queue initialized ({})", config.queue_name);

    // Initialize blob storage
    let blobs = storage::from_config(&config.storage).await;

    let worker_handle = if config.role.runs_worker() {
        let api_key = config
            .anthropic_api_key
            .clone()
            .context("ANTHROPIC_API_KEY must be set when APP_ROLE runs the worker")?;
        let llm = LlmClient::new(api_key)?;
        info!(
            "LLM client initialized (text model: {}, vision model: {})",
            llm_client::TEXT_MODEL,
            llm_client::VISION_MODEL
        );

        let converter = Arc::new(PdfiumConverter::new(
            config.pdfium_lib_dir.clone(),
            config.render_max_pixels,
        ));
        let worker = Worker::new(records.clone(), blobs.clone(), converter, Arc::new(llm));
        let poll_interval = Duration::from_secs(config.worker_poll_secs);

        // BRPOP holds its connection, so the worker must not share one with intake.
        let worker_queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(
            redis_client.clone(),
            config.queue_name.clone(),
        ));

        Some(tokio::spawn(worker.run(
            worker_queue,
            poll_interval,
            shutdown_signal(),
        )))
    } else {
        None
    };

    if config.role.serves_http() {
        let state = AppState {
            records,
            blobs,
            queue,
        };

        let app = build_router(state, config.max_upload_bytes)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed domain

        let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
        info!("Listening on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    if let Some(handle) = worker_handle {
        handle.await.context("worker task panicked")?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on ctrl-c. Each caller gets its own listener.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
