use anyhow::Context;
use cutqa_api::{
    app, auth::TokenManager, dropbox::DropboxClient, retry::RetryPolicy, AppState, Config,
    Pipeline,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cutqa_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        watch_path = %config.watch_path,
        marker = %config.marker,
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    let tokens = Arc::new(TokenManager::new(http.clone(), config.credentials.clone()));
    let storage = DropboxClient::new(
        http,
        tokens,
        config.watch_path.clone(),
        RetryPolicy::with_max_retries(config.max_retries),
    );
    let pipeline = Arc::new(Pipeline::new(Arc::new(storage), config.marker.clone()));
    let state = AppState::new(pipeline, Some(&config.credentials.app_secret));

    let addr = SocketAddr::new(config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("cutqa API listening on http://{addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
