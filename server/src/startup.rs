use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpServer;
use tokio::time;

use crate::{
    app::{build_app, AppState},
    auth_token::{AuthTokenError, AuthTokenService},
    config::{AppConfig, ConfigError},
    db,
    error::ApiError,
};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Database unavailable: {0}")]
    Database(#[source] ApiError),

    #[error("Token service: {0}")]
    Token(#[from] AuthTokenError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Connects to the database, then binds and serves until shutdown.
/// Nothing listens unless the database answered first.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    log::info!("Connecting to MongoDB (database '{}')...", config.database_name);
    let db_context = db::connect(&config.mongo_uri, &config.database_name)
        .await
        .map_err(StartupError::Database)?;

    log::info!("Initializing database indexes...");
    db_context
        .init_indexes()
        .await
        .map_err(StartupError::Database)?;

    let tokens = AuthTokenService::new(
        config.auth_token_secret.clone().into_bytes(),
        config.auth_token_ttl,
    )?;

    let state = AppState::new(config, Arc::new(db_context), tokens);

    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            rate_limiter.cleanup_old_entries();
            log::debug!(
                "Background cleanup: {} clients tracked by rate limiter",
                rate_limiter.tracked_clients()
            );
        }
    });

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let port = state.config.port;

    let server = HttpServer::new(move || build_app(state.clone()))
        .bind(&addr)
        .map_err(|source| StartupError::Bind { addr, source })?;

    log::info!("Server is listening on port {}", port);

    server.run().await.map_err(StartupError::Serve)
}
