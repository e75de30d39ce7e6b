//! Notification Worker
//!
//! Consumes `notification.fcm.*` and `notification.whatsapp` jobs from the
//! broker and delivers them through the push and WhatsApp providers.

use anyhow::Result;
use broker_client::RabbitBroker;
use notification_worker::database::NotificationStore;
use notification_worker::sender::PushSender;
use notification_worker::whatsapp::WhatsAppClient;
use notification_worker::worker::NotificationWorker;
use ridecore_config::AppConfig;
use ridecore_logging::init_console_logging;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("notification-worker", "info");

    info!("Starting Notification Worker");

    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!(broker_url = config.broker_url(), "Configuration loaded");

    // Connect to the broker; exhausting the retry budget is fatal
    let broker = RabbitBroker::connect(&config.broker)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to broker: {}", e))?;
    let broker = Arc::new(broker);

    // Database pool shared by the store
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let store = Arc::new(NotificationStore::new(pool).await?);
    let sender = Arc::new(PushSender::new(config.push.clone()));
    let whatsapp = Arc::new(WhatsAppClient::new(config.whatsapp.clone()));

    let worker = Arc::new(NotificationWorker::new(
        broker.clone(),
        sender,
        whatsapp,
        store,
    ));

    if let Err(e) = worker.run().await {
        error!(error = %e, "Failed to start consumers");
        return Err(e);
    }

    // Wait for shutdown signal
    info!("Notification Worker running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    broker.close().await;
    info!("Notification Worker stopped");

    Ok(())
}
