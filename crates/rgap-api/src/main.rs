//! RGAP API Server

use std::path::PathBuf;

use rgap_api::{AppState, routes};
use rgap_config::{LogConfig, LogFormat, load_system_config};
use rgap_db::{PgUserRepo, UserRepo, create_pool, run_migrations};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("RGAP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("rgap.kdl"));
    let config = load_system_config(&config_path)?;

    init_tracing(&config.log);
    info!(config = %config_path.display(), "Configuration loaded");

    // Create database pool
    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let purged = PgUserRepo::new(pool.clone())
        .delete_expired_sessions()
        .await?;
    if purged > 0 {
        info!(purged, "Removed expired sessions");
    }

    let addr = config.server.listen;
    let state = AppState::new(pool, config);

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Starting server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
