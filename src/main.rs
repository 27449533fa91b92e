mod config;
mod db;
mod error;
mod forms;
mod rate_limit;
mod routes;
mod services;
mod state;
mod views;

use std::net::SocketAddr;

use crate::config::{AppConfig, ConfigError};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::oauth::GoogleConfig;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("server i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let port = config.port;

    let google = GoogleConfig::from_env(&config.base_url);
    if google.is_none() {
        tracing::info!("google sign-in disabled (GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET unset)");
    }

    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    let rate_limiter = RateLimiter::new(RateLimitConfig::from_env());
    let limits = rate_limiter.config();
    tracing::info!(
        per_client = limits.per_client_limit,
        global = limits.global_limit,
        "auth rate limits configured"
    );
    let state = state::AppState::new(pool, config, google, rate_limiter);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "clinidesk listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
