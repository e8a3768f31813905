//! relia service entrypoint.

use relia_server::{create_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file, then RELIA__* environment overrides.
    let config_file = std::env::var("RELIA_CONFIG").ok();
    let settings = relia_config::load_settings(config_file.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))?;

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::bootstrap(settings).await?;
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
    tracing::info!("shutdown signal received");
}
