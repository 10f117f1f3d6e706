//! Somm Daemon - wine identification service.

use anyhow::Result;
use sommd::config::SommConfig;
use sommd::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SOMM_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Somm daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = SommConfig::load_default()?;
    info!(
        "  Tier models: {} / {} (escalation {})",
        config.models.tier1.model,
        config.models.tier1_5.model,
        if config.escalation.enabled { "on" } else { "off" }
    );

    server::run(config).await
}
