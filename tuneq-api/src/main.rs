//! tuneq-api - music request service
//!
//! Accepts free-form music queries over HTTP, deduplicates them by normalized
//! key, and fetches, uploads and caches audio in the background.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuneq_common::config::{default_config_path, load_toml_config};
use tuneq_common::events::EventBus;

use tuneq_api::config::{CliOverrides, ServiceConfig};
use tuneq_api::db::{self, JobStore};
use tuneq_api::services::{GeminiTranslator, TelegramStorage, YtDlpFetcher};
use tuneq_api::workflow::{Dispatcher, JobExecutor, PipelineRunner};
use tuneq_api::{build_router, AppState};

const EVENT_BUS_CAPACITY: usize = 100;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const INTERRUPTED_DETAIL: &str = "interrupted by restart";

/// Command-line arguments for tuneq-api
#[derive(Parser, Debug)]
#[command(name = "tuneq-api")]
#[command(about = "Music request service with background fetch and upload")]
#[command(version)]
struct Args {
    /// TOML bootstrap config file
    #[arg(short, long, env = "TUNEQ_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and scratch directory
    #[arg(short, long, env = "TUNEQ_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TUNEQ_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "TUNEQ_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let toml_config = load_toml_config(&config_path).context("Failed to load TOML config")?;

    let config = ServiceConfig::resolve(
        &CliOverrides {
            root_folder: args.root_folder,
            port: args.port,
            bind_address: args.bind,
        },
        &toml_config,
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tuneq-api");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to initialize root folder")?;

    info!("Database: {}", config.database_path.display());
    let pool = db::init_database_pool(&config.database_path).await?;
    let store = JobStore::new(pool, config.store_policy);

    let recovered = store
        .recover_interrupted(INTERRUPTED_DETAIL)
        .await
        .context("Failed to recover interrupted jobs")?;
    if recovered > 0 {
        warn!("Marked {} interrupted job(s) as error", recovered);
    }

    let translator = GeminiTranslator::from_config(&toml_config.translator)
        .context("Failed to configure translator")?;
    let fetcher = YtDlpFetcher::from_config(&toml_config.fetcher, config.scratch_dir.clone());
    if !fetcher.is_available().await {
        warn!(
            "Fetcher binary '{}' not found; every pipeline attempt will fail",
            toml_config.fetcher.binary
        );
    }
    let storage = TelegramStorage::from_config(&toml_config.storage, config.pipeline_timeouts.upload)
        .context("Failed to configure storage")?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let executor = JobExecutor::new();
    let runner = Arc::new(PipelineRunner::new(
        store.clone(),
        Arc::new(fetcher),
        Arc::new(storage),
        event_bus.clone(),
        config.pipeline_timeouts,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        Arc::new(translator),
        runner,
        executor.clone(),
        event_bus,
    ));

    let app = build_router(AppState::new(dispatcher));

    let addr = config.socket_addr()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Waiting for {} pipeline attempt(s) to finish", executor.in_flight());
    if tokio::time::timeout(DRAIN_TIMEOUT, executor.wait_idle()).await.is_err() {
        warn!(
            "{} pipeline attempt(s) still running after {}s; they will be recovered on next start",
            executor.in_flight(),
            DRAIN_TIMEOUT.as_secs()
        );
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
