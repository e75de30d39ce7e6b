//! Wallet Adjustment Worker
//!
//! Consumes `driver.wallet.bulk` jobs from the broker and applies each
//! driver's balance change atomically with its ledger entry.

use anyhow::Result;
use broker_client::RabbitBroker;
use ridecore_config::AppConfig;
use ridecore_logging::init_console_logging;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use wallet_worker::ledger::WalletLedger;
use wallet_worker::worker::WalletWorker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("wallet-worker", "info");

    info!("Starting Wallet Adjustment Worker");

    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!(broker_url = config.broker_url(), "Configuration loaded");

    // Connect to the broker; exhausting the retry budget is fatal
    let broker = RabbitBroker::connect(&config.broker)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to broker: {}", e))?;
    let broker = Arc::new(broker);

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let ledger = Arc::new(WalletLedger::new(pool));
    let admin_fallback = config
        .otp
        .as_ref()
        .map(|otp| otp.website_name.clone())
        .unwrap_or_else(|| "RideCore".to_string());

    let worker = Arc::new(WalletWorker::new(broker.clone(), ledger, admin_fallback));

    if let Err(e) = worker.run().await {
        error!(error = %e, "Failed to start consumer");
        return Err(e);
    }

    // Wait for shutdown signal
    info!("Wallet Adjustment Worker running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    broker.close().await;
    info!("Wallet Adjustment Worker stopped");

    Ok(())
}
