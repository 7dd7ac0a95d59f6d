use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trade_engine::api::routes::create_router;
use trade_engine::config::AppConfig;
use trade_engine::db::Database;
use trade_engine::engine::{
    CommandQueue, EngineConfig, EngineHandle, MatchingEngine, SnapshotRegistry,
};
use trade_engine::events::EventHub;
use trade_engine::intake::Intake;
use trade_engine::metrics::init_metrics;
use trade_engine::store::PgOrderStore;
use trade_engine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trade_engine=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting trade engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Install metrics recorder
    let metrics_handle = init_metrics();

    // Initialize database
    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    db.migrate().await?;
    tracing::info!("Database connected and migrated");

    let store = Arc::new(PgOrderStore::new(db.pool.clone()));
    let snapshots = SnapshotRegistry::new();
    let events = EventHub::new(config.event_channel_capacity);
    let (queue_tx, queue_rx) = CommandQueue::new(config.queue_capacity);

    // Build the matching engine and rebuild its books from the store
    let engine_config = EngineConfig {
        snapshot_depth: config.book_snapshot_depth,
        delta_depth: config.book_delta_depth,
        ..EngineConfig::default()
    };
    let mut engine = MatchingEngine::new(
        Arc::clone(&store),
        snapshots.clone(),
        events.clone(),
        engine_config,
    );

    match engine.recover().await {
        Ok(count) => {
            if count > 0 {
                tracing::info!("Recovered {} resting orders into the books", count);
            } else {
                tracing::info!("No live orders to recover");
            }
        }
        Err(e) => {
            tracing::error!("Recovery failed: {}", e);
            tracing::warn!("Starting with partially rebuilt books");
        }
    }

    // Start the single matching worker
    let engine_handle = EngineHandle::spawn(engine, queue_rx);
    tracing::info!(
        "Matching worker started (queue capacity {})",
        config.queue_capacity
    );

    let intake = Intake::new(Arc::clone(&store), queue_tx);

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        store,
        intake,
        snapshots,
        events,
        metrics: metrics_handle,
    });

    // Build router
    let app = create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the worker; queued commands stay persisted as open and will be
    // re-inserted by recovery on the next start.
    engine_handle.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
