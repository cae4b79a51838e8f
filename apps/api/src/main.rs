use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::auth::SessionStore;
use api::config::Config;
use api::db::create_pool;
use api::routes::build_router;
use api::state::AppState;
use api::store::adapter::{ActivityLog, AdapterKind, CollectionAdapter};
use api::store::kv::KvAdapter;
use api::store::relational::PgAdapter;
use api::store::static_files::StaticFileAdapter;
use api::store::ProposalStore;
use api::sync::migrate::{migrate_local_to_remote, wait_for_remote};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PolicyMap API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let kv = Arc::new(KvAdapter::new(redis));
    let pg = Arc::new(PgAdapter::new(db));
    pg.ensure_schema().await?;

    // One-way key-value → relational migration, resumable at record
    // granularity. Runs on every startup; completed runs no-op.
    wait_for_remote(pg.as_ref(), 5, Duration::from_millis(250)).await?;
    let report = migrate_local_to_remote(
        kv.as_ref(),
        pg.as_ref(),
        kv.as_ref(),
        config.migration_batch_size,
        Duration::from_millis(config.migration_batch_delay_ms),
    )
    .await?;
    info!(
        "Migration outcome: {:?} ({} records copied)",
        report.outcome, report.migrated
    );

    let adapter: Arc<dyn CollectionAdapter> = match config.active_adapter {
        AdapterKind::KeyValue => kv.clone(),
        AdapterKind::Relational => pg.clone(),
        AdapterKind::StaticFiles => {
            Arc::new(StaticFileAdapter::new(config.data_dir.as_ref()))
        }
    };
    info!("Active adapter: {}", config.active_adapter.as_str());

    let store = Arc::new(ProposalStore::open(adapter, kv.clone() as Arc<dyn ActivityLog>).await?);
    let sessions = Arc::new(SessionStore::new(ChronoDuration::seconds(
        config.session_ttl_secs,
    )));

    // Build app state
    let state = AppState {
        store,
        sessions,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
