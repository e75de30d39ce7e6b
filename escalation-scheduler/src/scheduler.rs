//! Cron-driven job loops
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


use chrono::Utc;
use croner::Cron;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Pending driver acceptance check
pub const ACCEPTANCE_CRON: &str = "*/10 * * * *";
/// Late trip pickup check
pub const LATE_PICKUP_CRON: &str = "*/30 * * * *";
/// Document expiry check, daily at midnight
pub const DOCUMENT_EXPIRY_CRON: &str = "0 0 * * *";
/// Tariff price-change apply/revert, daily at midnight
pub const PRICE_CHANGE_CRON: &str = "0 0 * * *";

/// Spawn one independently-scheduled job loop.
///
/// Each job runs on its own task: an error is logged and the loop keeps
/// going, and nothing one job does can cancel the others.
pub fn spawn_cron<F, Fut>(name: &'static str, pattern: &'static str, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let cron = match Cron::new(pattern).parse() {
            Ok(cron) => cron,
            Err(e) => {
                error!(job = name, pattern, error = %e, "Invalid cron pattern");
                return;
            }
        };

        info!(job = name, pattern, "Scheduled job started");

        loop {
            let now = Utc::now();
            let next = match cron.find_next_occurrence(&now, false) {
                Ok(next) => next,
                Err(e) => {
                    error!(job = name, error = %e, "No next occurrence, stopping job");
                    return;
                }
            };

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = job().await {
                error!(job = name, error = %e, "Scheduled job failed");
            }
        }
    })
}
