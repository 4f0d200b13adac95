use anyhow::Context;
use tracing_subscriber::EnvFilter;

use notatki_server::config::Config;
use notatki_server::server::{AppState, start_server};

fn init_tracing(level: &str) {
    // RUST_LOG があればそちらを優先
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.logging.level);

    tracing::info!(
        env = ?config.server.env,
        storage = ?config.database.backend,
        ai = ?config.ai.provider,
        "starting notatki-server"
    );

    let state = AppState::from_config(config).await?;
    start_server(state).await
}
