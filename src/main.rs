// src/main.rs

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use zapbridge::config::Config;
use zapbridge::llm::{OpenAiEmbeddings, OpenWebUiClient};
use zapbridge::memory::sqlite::{SqliteMessageStore, migration};
use zapbridge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing required settings abort here with a nonzero exit.
    let config = Config::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting zapbridge");
    info!("Model: {}", config.completion_model);

    // Database pool + schema
    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.sqlite_max_connections)
        .connect_with(connect_options)
        .await?;
    migration::run_migrations(&pool).await?;

    let store = Arc::new(SqliteMessageStore::new(pool));
    let embeddings = Arc::new(OpenAiEmbeddings::new(config.openai_api_key.clone()));
    let completion = Arc::new(OpenWebUiClient::new(&config));

    // Reachability check on the completion endpoint; informational only.
    match completion.probe().await {
        Ok(()) => info!("Completion API is accessible"),
        Err(e) => warn!("Completion API probe failed: {e}"),
    }

    let app_state = Arc::new(AppState::new(
        config.clone(),
        store,
        embeddings,
        completion,
    ));

    // Start the gateway session after a short delay so the rest of the
    // process is up before the first connect.
    let session = app_state.gateway.clone();
    let startup_delay = Duration::from_secs(config.startup_delay_secs);
    tokio::spawn(async move {
        tokio::time::sleep(startup_delay).await;
        session.start();
    });

    let app = zapbridge::api::router(app_state.clone());
    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("HTTP server listening on {}", bind_address);

    let shutdown_state = app_state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            shutdown_state.gateway.stop();
        })
        .await?;

    Ok(())
}
