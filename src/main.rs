use tracing_subscriber::EnvFilter;

use artisan_crm_api::config;
use artisan_crm_api::database::DatabaseManager;
use artisan_crm_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = config::config();

    let default_filter = if config.api.enable_request_logging { "info,tower_http=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    tracing::info!(
        "Starting Artisan CRM API in {:?} mode ({:?} tenant binding)",
        config.environment,
        config.tenancy.binding
    );

    if config.security.verify_token_signature && config.security.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET is not set; bearer tokens will never resolve a tenant");
    }

    let pool = DatabaseManager::connect_lazy(&config.database, config.tenancy.binding)?;
    let state = AppState::new(config, pool.clone());
    let app = artisan_crm_api::app(state, &config.security.cors_origins);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
