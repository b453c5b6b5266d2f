mod config;

use std::sync::Arc;

use tracing::{info, warn};

use cardwall_api::assets::AssetStore;
use cardwall_api::auth::AppStateInner;
use cardwall_api::provider::JwtAuthProvider;
use cardwall_api::routes::router;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardwall=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and asset root
    let db = Arc::new(cardwall_db::Database::open(&config.db_path)?);
    let assets = Arc::new(AssetStore::new(config.upload_dir.clone()).await?);

    let state = AppStateInner::new(
        db,
        Arc::new(JwtAuthProvider::new(config.jwt_secret.clone())),
        assets,
        config.public_url.clone(),
        config.limits,
    );

    let app = router(state);

    info!("Cardwall server listening on {}", config.addr);
    info!("Serving assets at {}", config.public_url);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
