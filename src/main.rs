use anyhow::Result;
use clap::Parser;
use tracing::info;

use sigsmith::{Aggregator, AggregatorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    sigsmith::telemetry::init();

    let config = AggregatorConfig::parse();
    info!("starting sigsmith aggregator");

    let aggregator = Aggregator::initialize(config)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    aggregator.run(shutdown_rx).await
}
