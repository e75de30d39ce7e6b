//! Escalation Scheduler
//!
//! Runs the periodic booking/driver escalation jobs and publishes admin
//! alerts through the same broker channel the workers use.

use anyhow::Result;
use broker_client::RabbitBroker;
use escalation_scheduler::jobs::EscalationJobs;
use escalation_scheduler::scheduler::{
    spawn_cron, ACCEPTANCE_CRON, DOCUMENT_EXPIRY_CRON, LATE_PICKUP_CRON, PRICE_CHANGE_CRON,
};
use escalation_scheduler::store::EscalationStore;
use ridecore_config::AppConfig;
use ridecore_logging::init_console_logging;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("escalation-scheduler", "info");

    info!("Starting Escalation Scheduler");

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

    let store = Arc::new(EscalationStore::new(pool).await?);
    let jobs = Arc::new(EscalationJobs::new(store, broker.clone()));

    let acceptance = {
        let jobs = Arc::clone(&jobs);
        spawn_cron("pending-driver-acceptance", ACCEPTANCE_CRON, move || {
            let jobs = Arc::clone(&jobs);
            async move { jobs.pending_driver_acceptance().await }
        })
    };
    let late_pickup = {
        let jobs = Arc::clone(&jobs);
        spawn_cron("late-trip-pickup", LATE_PICKUP_CRON, move || {
            let jobs = Arc::clone(&jobs);
            async move { jobs.late_pickups().await }
        })
    };
    let documents = {
        let jobs = Arc::clone(&jobs);
        spawn_cron("document-expiry", DOCUMENT_EXPIRY_CRON, move || {
            let jobs = Arc::clone(&jobs);
            async move { jobs.document_expiry().await }
        })
    };
    let prices = {
        let jobs = Arc::clone(&jobs);
        spawn_cron("price-changes", PRICE_CHANGE_CRON, move || {
            let jobs = Arc::clone(&jobs);
            async move { jobs.price_changes().await }
        })
    };

    // Wait for shutdown signal
    info!("Escalation Scheduler running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    for handle in [acceptance, late_pickup, documents, prices] {
        handle.abort();
    }
    broker.close().await;
    info!("Escalation Scheduler stopped");

    Ok(())
}
