use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod api;
mod config;
mod engine;
mod models;
mod reason;
mod view;

use crate::config::MonitorConfig;
use crate::engine::Checker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_ansi(true)
        .init();

    let config_path =
        std::env::var("PULSEBOARD_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config_content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {config_path}"))?;
    let mut config: MonitorConfig = serde_json::from_str(&config_content)
        .with_context(|| format!("failed to parse {config_path}"))?;

    if let Some(port) = std::env::var("PULSEBOARD_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        config.listen_port = port;
    }

    let listen_port = config.listen_port;
    let checker = Arc::new(Checker::new(config)?);

    let api_checker = Arc::clone(&checker);
    tokio::spawn(async move {
        if let Err(e) = api::start_server(listen_port, api_checker).await {
            error!("api server failed: {e:#}");
        }
    });

    let engine_checker = Arc::clone(&checker);
    tokio::spawn(async move {
        engine_checker.run().await;
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping pulseboard");

    Ok(())
}
