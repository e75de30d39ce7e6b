//! Wallet Adjustment Worker - Job Processing
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::ledger::{AdjustmentReceipt, WalletLedger};
use broker_client::{BrokerClient, MessageHandler};
use chrono::Utc;
use futures::future::join_all;
use ridecore_types::{
    AdjustmentType, Audience, Exchange, JobDriver, PushIds, PushJob, PushPayload, RoutingKey,
    WalletAdjustmentJob, WalletAdjustmentRequest, WalletTarget,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Drivers processed concurrently inside one sub-batch
pub const DRIVER_BATCH_SIZE: usize = 25;

/// Per-job outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rejected: bool,
}

enum DriverOutcome {
    Applied,
    Skipped,
    Failed,
}

/// Wallet adjustment worker
pub struct WalletWorker {
    broker: Arc<dyn BrokerClient>,
    ledger: Arc<WalletLedger>,
    /// Ledger attribution when the admin row is missing
    admin_fallback: String,
}

impl WalletWorker {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        ledger: Arc<WalletLedger>,
        admin_fallback: String,
    ) -> Self {
        Self {
            broker,
            ledger,
            admin_fallback,
        }
    }

    /// Register the worker's consumer on the broker
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!("Subscribing to driver.wallet.*");

        let worker = Arc::clone(&self);
        let handler: MessageHandler = Arc::new(move |payload, key| {
            let worker = Arc::clone(&worker);
            Box::pin(async move { worker.handle_message(payload, key).await })
        });
        self.broker
            .consume(Exchange::Driver, "driver.wallet.*", handler)
            .await?;

        Ok(())
    }

    async fn handle_message(
        &self,
        payload: serde_json::Value,
        key: RoutingKey,
    ) -> anyhow::Result<()> {
        match key {
            RoutingKey::DriverWallet(WalletTarget::Bulk) => {}
            other => {
                warn!(routing_key = %other, "Unsupported wallet target, dropping");
                return Ok(());
            }
        }

        // A body that does not decode is poison; the error nacks it away
        let job: WalletAdjustmentJob = serde_json::from_value(payload)
            .map_err(|e| anyhow::anyhow!("invalid wallet job body: {e}"))?;

        self.process_job(job).await;
        Ok(())
    }

    /// Process one bulk job: validate, resolve the admin name once, then
    /// work through fixed-size sub-batches strictly in order. Drivers
    /// inside a sub-batch run concurrently; one driver's failure never
    /// aborts its siblings.
    pub async fn process_job(&self, job: WalletAdjustmentJob) -> JobSummary {
        if let Err(e) = job.validate() {
            warn!(job_id = job.job_id.as_str(), error = %e, "Rejecting wallet job");
            return JobSummary {
                rejected: true,
                ..Default::default()
            };
        }

        let admin_name = match self.ledger.admin_display_name(&job.admin_id).await {
            Ok(Some(name)) => name,
            Ok(None) => self.admin_fallback.clone(),
            Err(e) => {
                warn!(
                    job_id = job.job_id.as_str(),
                    admin_id = job.admin_id.as_str(),
                    error = %e,
                    "Admin lookup failed, using fallback name"
                );
                self.admin_fallback.clone()
            }
        };

        let mut summary = JobSummary::default();

        // Batch N+1 must not start until batch N has fully settled; this
        // bounds peak concurrent database transactions.
        for chunk in job.drivers.chunks(DRIVER_BATCH_SIZE) {
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|driver| self.process_driver(&job, driver, &admin_name)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    DriverOutcome::Applied => summary.applied += 1,
                    DriverOutcome::Skipped => summary.skipped += 1,
                    DriverOutcome::Failed => summary.failed += 1,
                }
            }
        }

        info!(
            job_id = job.job_id.as_str(),
            chunk = job.chunk.map(|c| c.index).unwrap_or(0),
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "Wallet bulk job processed"
        );

        summary
    }

    async fn process_driver(
        &self,
        job: &WalletAdjustmentJob,
        driver: &JobDriver,
        admin_name: &str,
    ) -> DriverOutcome {
        match self
            .ledger
            .apply(driver, &job.request, admin_name, Utc::now())
            .await
        {
            Ok(Some(receipt)) => {
                self.notify_driver(driver, &job.request, &receipt).await;
                DriverOutcome::Applied
            }
            Ok(None) => DriverOutcome::Skipped,
            Err(e) => {
                error!(
                    job_id = job.job_id.as_str(),
                    driver_id = driver.driver_id.as_str(),
                    error = %e,
                    "Wallet adjustment failed, rolled back"
                );
                DriverOutcome::Failed
            }
        }
    }

    /// Post-commit notification: emitted as a push job on the broker so
    /// delivery failures stay outside the financial consistency boundary.
    async fn notify_driver(
        &self,
        driver: &JobDriver,
        request: &WalletAdjustmentRequest,
        receipt: &AdjustmentReceipt,
    ) {
        let is_credit = request.adjustment_type == AdjustmentType::Add;
        let title = format!(
            "Wallet {} : {}",
            if is_credit { "Credit" } else { "Debit" },
            request.amount
        );
        let message = request.reason.clone().unwrap_or_else(|| {
            if is_credit {
                "Admin added amount to your wallet".to_string()
            } else {
                "Admin deducted amount from your wallet".to_string()
            }
        });

        let push = PushJob {
            fcm_token: driver.fcm_token.clone(),
            fcm_tokens: None,
            kind: Some("wallet".to_string()),
            payload: Some(PushPayload {
                title: Some(title),
                message: Some(message),
                image_url: None,
                driver_name: driver.name.clone(),
                ids: PushIds {
                    admin_id: Some(driver.admin_id.clone()),
                    driver_id: Some(driver.driver_id.clone()),
                    ..Default::default()
                },
            }),
        };

        let payload = match serde_json::to_value(&push) {
            Ok(v) => v,
            Err(e) => {
                error!(driver_id = driver.driver_id.as_str(), error = %e, "Failed to encode wallet push");
                return;
            }
        };

        let sent = self
            .broker
            .publish_best_effort(
                Exchange::Notification,
                &RoutingKey::NotificationFcm(Audience::Driver),
                &payload,
            )
            .await;

        if !sent {
            warn!(
                driver_id = driver.driver_id.as_str(),
                transaction_id = receipt.transaction_id.as_str(),
                "Wallet notification not delivered to broker"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_client::MemoryBroker;
    use rust_decimal::Decimal;
    use sqlx::postgres::PgPoolOptions;

    fn job(amount: i64, drivers: Vec<JobDriver>) -> WalletAdjustmentJob {
        WalletAdjustmentJob {
            job_id: "job-1".to_string(),
            admin_id: "A1".to_string(),
            chunk: None,
            request: WalletAdjustmentRequest {
                amount: Decimal::from(amount),
                reason: Some("test adjustment".to_string()),
                adjustment_type: AdjustmentType::Add,
                days: None,
                status_filter: None,
            },
            drivers,
        }
    }

    fn lazy_worker(broker: Arc<MemoryBroker>) -> WalletWorker {
        // connect_lazy never touches the database; fine for paths that
        // must reject before any query runs
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:5432/ridecore_test")
            .unwrap();
        WalletWorker::new(broker, Arc::new(WalletLedger::new(pool)), "RideCore".to_string())
    }

    #[tokio::test]
    async fn test_empty_driver_list_rejected_without_side_effects() {
        let broker = Arc::new(MemoryBroker::new());
        let worker = lazy_worker(Arc::clone(&broker));

        let summary = worker.process_job(job(100, vec![])).await;

        assert!(summary.rejected);
        assert_eq!(summary.applied, 0);
        assert!(broker.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected_without_side_effects() {
        let broker = Arc::new(MemoryBroker::new());
        let worker = lazy_worker(Arc::clone(&broker));

        let drivers = vec![JobDriver {
            driver_id: "D1".to_string(),
            wallet_id: "W1".to_string(),
            admin_id: "A1".to_string(),
            name: None,
            phone: None,
            fcm_token: None,
        }];
        let summary = worker.process_job(job(0, drivers)).await;

        assert!(summary.rejected);
        assert!(broker.published().await.is_empty());
    }

    #[test]
    fn test_chunking_is_25_wide() {
        let drivers: Vec<u32> = (0..60).collect();
        let chunks: Vec<_> = drivers.chunks(DRIVER_BATCH_SIZE).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 25);
        assert_eq!(chunks[1].len(), 25);
        assert_eq!(chunks[2].len(), 10);
    }
}
