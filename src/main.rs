//! postflow server
//!
//! Runs the workflow engine behind the HTTP API, with SQLite-backed error
//! snapshots and a periodic sweeper for idle contexts.

use postflow::adapters::{
    LoggingCaptionGenerator, LoggingMediaProvider, LoggingPublisher, LoggingTransport,
    OpenAiCaptionGenerator, StockMediaProvider, SwitchboardCanvasRenderer,
};
use postflow::api::{create_router, AppState, Engine};
use postflow::runtime::SweepReport;
use postflow::snapshots::{SnapshotStore, SqliteSnapshotStore};
use postflow::store::{ContextStore, InMemoryContextStore};
use postflow::{EngineConfig, ProviderConfig, ServerConfig, WorkflowManager};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let server = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    let providers = ProviderConfig::from_env();

    tracing::info!(path = %server.db_path.display(), "Opening snapshot store");
    let sqlite = SqliteSnapshotStore::open(&server.db_path)?;
    // Lock waits must end before the recorder gives up on the write
    sqlite.set_busy_timeout(engine_config.snapshot_write_timeout / 2)?;
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(sqlite);
    let contexts: Arc<dyn ContextStore> = Arc::new(InMemoryContextStore::new());

    let captions = OpenAiCaptionGenerator::new(&providers);
    if !captions.is_configured() {
        tracing::warn!("OPENAI_API_KEY is not set; caption generation will fail");
    }
    let media = StockMediaProvider::new(&providers);
    let sources = media.configured_sources();
    if sources.is_empty() {
        tracing::warn!("No stock media keys configured. Set UNSPLASH_ACCESS_KEY, PEXELS_API_KEY or PIXABAY_API_KEY.");
    } else {
        tracing::info!(sources = ?sources, "Stock media sources available");
    }
    let media = SwitchboardCanvasRenderer::new(&providers, media);
    if !media.is_configured() {
        tracing::info!("SWITCHBOARD_API_KEY is not set; posts use the selected image as is");
    }

    let engine: Engine = WorkflowManager::builder(contexts, snapshots)
        .config(engine_config)
        .captions(Arc::new(LoggingCaptionGenerator::new(Arc::new(captions))))
        .media(Arc::new(LoggingMediaProvider::new(Arc::new(media))))
        .publisher(Arc::new(LoggingPublisher))
        .build()?;
    let state = AppState::new(engine, Arc::new(LoggingTransport));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sweep_loop(
        state.engine.clone(),
        server.sweep_interval,
        shutdown.clone(),
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    tracing::info!("postflow server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Sweeper task failed");
    }
    tracing::info!("postflow server stopped");
    Ok(())
}

/// Periodically expire idle contexts and purge old snapshots
async fn sweep_loop(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                let report = engine.sweep(chrono::Utc::now()).await;
                if report != SweepReport::default() {
                    tracing::info!(
                        expired_contexts = report.expired_contexts,
                        pruned_deliveries = report.pruned_deliveries,
                        purged_snapshots = report.purged_snapshots,
                        "Sweep finished"
                    );
                }
            }
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                shutdown.cancelled().await;
            }
        },
        () = shutdown.cancelled() => {}
    }
}
