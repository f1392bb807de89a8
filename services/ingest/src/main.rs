use std::path::PathBuf;

use ingest::config::AppConfig;
use ingest::engine::IngestEngine;
use ingest::logging;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Optional config file as the first argument; env overrides apply on top
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    logging::init(&config.log_directory);
    tracing::info!(
        tcp_port = config.tcp_port,
        pipe = %config.pipe_name,
        "starting trading-data ingest service"
    );

    let mut engine = IngestEngine::new(config)?;
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received; shutting down");
    engine.shutdown().await;

    Ok(())
}
