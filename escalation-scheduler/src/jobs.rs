//! Escalation jobs
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


use crate::store::{DriverDocRow, EscalationBooking, EscalationStore, VehicleDocRow};
use broker_client::BrokerClient;
use chrono::{DateTime, Duration, Utc};
use ridecore_types::{
    AdminAlertJob, Audience, Exchange, PushIds, PushJob, PushPayload, RoutingKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Minutes a driver may sit on a booking request before the admin hears
pub const ACCEPTANCE_THRESHOLD_MIN: i64 = 10;

/// Overdue pickups alert once per this many minutes
pub const PICKUP_MILESTONE_MIN: i64 = 30;

/// Whether a pending booking has crossed the acceptance threshold AND is
/// outside the dedup window. The dual condition is what prevents a
/// repeat alert on every cron tick.
pub fn needs_acceptance_escalation(
    request_sent_time: DateTime<Utc>,
    last_admin_notify_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let threshold = now - Duration::minutes(ACCEPTANCE_THRESHOLD_MIN);
    request_sent_time <= threshold
        && last_admin_notify_time.is_none_or(|notified| notified <= threshold)
}

/// Overdue pickups notify only on exact 30-minute milestones; combined
/// with the 30-minute cron period this yields one alert per milestone
/// without a dedicated dedup column.
pub fn is_late_pickup_milestone(minutes_overdue: i64) -> bool {
    minutes_overdue > 0 && minutes_overdue % PICKUP_MILESTONE_MIN == 0
}

/// Names of every currently-expired document for a driver and their
/// vehicles.
pub fn expired_documents(
    driver: &DriverDocRow,
    vehicles: &[VehicleDocRow],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut expired = Vec::new();

    if let Some(validity) = driver.license_validity {
        if validity < now {
            expired.push("Driver License".to_string());
        }
    }

    for vehicle in vehicles {
        let label = vehicle.vehicle_number.as_deref().unwrap_or("vehicle");
        if vehicle.rc_expiry_date.is_some_and(|d| d < now) {
            expired.push(format!("RC Book ({label})"));
        }
        if vehicle.insurance_expiry_date.is_some_and(|d| d < now) {
            expired.push(format!("Insurance ({label})"));
        }
        if vehicle.pollution_expiry_date.is_some_and(|d| d < now) {
            expired.push(format!("Pollution Certificate ({label})"));
        }
    }

    expired
}

/// The scheduler's job set, sharing one store and one broker handle
pub struct EscalationJobs {
    store: Arc<EscalationStore>,
    broker: Arc<dyn BrokerClient>,
}

impl EscalationJobs {
    pub fn new(store: Arc<EscalationStore>, broker: Arc<dyn BrokerClient>) -> Self {
        Self { store, broker }
    }

    /// Every 10 minutes: alert admins about bookings no driver accepted
    pub async fn pending_driver_acceptance(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        info!("Running driver acceptance check");

        let bookings = self.store.pending_acceptance_bookings().await?;
        let mut notified = 0;

        for booking in bookings {
            let Some(sent) = booking.request_sent_time else {
                continue;
            };
            if !needs_acceptance_escalation(sent, booking.last_admin_notify_time, now) {
                continue;
            }

            let title = format!("Driver Still Pending - Booking #{}", booking.booking_id);
            let description = format!(
                "Driver has not accepted booking since {}. From: {}. To: {}",
                sent.format("%I:%M %p"),
                booking.pickup.as_deref().unwrap_or("N/A"),
                booking.drop_location.as_deref().unwrap_or("N/A"),
            );

            if self.notify_admin(&booking, title, description, now).await {
                notified += 1;
            }
        }

        info!(notified, "Driver acceptance check completed");
        Ok(())
    }

    /// Every 30 minutes: alert admins on each late-pickup milestone
    pub async fn late_pickups(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        info!("Running late trip pickup check");

        let bookings = self.store.overdue_pickups(now).await?;
        let mut notified = 0;

        for booking in bookings {
            let Some(pickup_at) = booking.pickup_date_time else {
                continue;
            };
            let minutes_overdue = (now - pickup_at).num_minutes();
            if !is_late_pickup_milestone(minutes_overdue) {
                continue;
            }

            info!(
                booking_id = booking.booking_id.as_str(),
                minutes_overdue, "Booking overdue, notifying admin"
            );

            let title = format!("Late Trip Pickup - Booking #{}", booking.booking_id);
            let description = format!(
                "Trip pickup for booking is overdue by {} minutes. From: {}. To: {}",
                minutes_overdue,
                booking.pickup.as_deref().unwrap_or("N/A"),
                booking.drop_location.as_deref().unwrap_or("N/A"),
            );

            if self.notify_admin(&booking, title, description, now).await {
                notified += 1;
            }
        }

        info!(notified, "Late trip pickup check completed");
        Ok(())
    }

    /// Daily: tell each driver every document that is currently expired.
    /// No per-document state is tracked; the job is informational and
    /// re-describes the full expired set each run.
    pub async fn document_expiry(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        info!("Running document expiry check");

        let drivers = self.store.active_drivers().await?;
        let vehicles = self.store.active_vehicles().await?;

        let mut by_driver: HashMap<&str, Vec<&VehicleDocRow>> = HashMap::new();
        for vehicle in &vehicles {
            by_driver.entry(vehicle.driver_id.as_str()).or_default().push(vehicle);
        }

        let mut sent = 0;
        let mut skipped = 0;

        for driver in &drivers {
            let driver_vehicles: Vec<VehicleDocRow> = by_driver
                .get(driver.driver_id.as_str())
                .map(|v| v.iter().map(|r| (*r).clone()).collect())
                .unwrap_or_default();

            let expired = expired_documents(driver, &driver_vehicles, now);
            if expired.is_empty() {
                continue;
            }

            let token = match self
                .store
                .fresh_driver_token(&driver.admin_id, &driver.driver_id)
                .await?
            {
                Some(token) => Some(token),
                None => driver.fcm_token.clone(),
            };
            let Some(token) = token else {
                debug!(
                    driver_id = driver.driver_id.as_str(),
                    expired = expired.join(", "),
                    "Driver has expired documents but no device token"
                );
                skipped += 1;
                continue;
            };

            let message = format!(
                "Dear {}, the following documents have expired: {}. \
                 Please renew them immediately to continue your services.",
                driver.name.as_deref().unwrap_or("Driver"),
                expired.join(", "),
            );

            let push = PushJob {
                fcm_token: Some(token),
                fcm_tokens: None,
                kind: Some("document-expiry".to_string()),
                payload: Some(PushPayload {
                    title: Some("Document Expiry Alert".to_string()),
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

            let delivered = self
                .broker
                .publish_best_effort(
                    Exchange::Notification,
                    &RoutingKey::NotificationFcm(Audience::Driver),
                    &serde_json::to_value(&push)?,
                )
                .await;
            if delivered {
                sent += 1;
            } else {
                skipped += 1;
            }
        }

        info!(sent, skipped, "Document expiry check completed");
        Ok(())
    }

    /// Daily: apply price deltas that came due, revert the exhausted ones
    pub async fn price_changes(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        info!("Running price update check");

        for change in self.store.price_changes_due(now).await? {
            if let Err(e) = self.store.apply_price_change(&change).await {
                error!(
                    price_change_id = change.price_change_id.as_str(),
                    error = %e,
                    "Failed to apply price change"
                );
            }
        }

        for change in self.store.price_changes_expired(now).await? {
            if let Err(e) = self.store.revert_price_change(&change).await {
                error!(
                    price_change_id = change.price_change_id.as_str(),
                    error = %e,
                    "Failed to revert price change"
                );
            }
        }

        info!("Price update check completed");
        Ok(())
    }

    /// Persist the admin row, stamp the dedup gate, publish the alert.
    /// The stamp happens only after the row insert succeeds, so a failed
    /// insert leaves the booking eligible for the next tick.
    async fn notify_admin(
        &self,
        booking: &EscalationBooking,
        title: String,
        description: String,
        now: DateTime<Utc>,
    ) -> bool {
        let notification_id = match self
            .store
            .insert_admin_notification(&booking.admin_id, &title, &description)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(
                    booking_id = booking.booking_id.as_str(),
                    error = %e,
                    "Failed to persist admin notification"
                );
                return false;
            }
        };

        if let Err(e) = self.store.stamp_admin_notify(&booking.booking_id, now).await {
            error!(
                booking_id = booking.booking_id.as_str(),
                error = %e,
                "Failed to stamp admin notify time"
            );
        }

        let alert = AdminAlertJob {
            admin_id: booking.admin_id.clone(),
            notification_id: Some(notification_id.to_string()),
            title,
            description,
            kind: "booking".to_string(),
            read: false,
            date: now,
            time: now.format("%I:%M %p").to_string(),
        };

        match serde_json::to_value(&alert) {
            Ok(payload) => {
                self.broker
                    .publish_best_effort(
                        Exchange::Notification,
                        &RoutingKey::NotificationAdmin,
                        &payload,
                    )
                    .await;
            }
            Err(e) => {
                error!(booking_id = booking.booking_id.as_str(), error = %e, "Failed to encode alert");
            }
        }

        info!(
            booking_id = booking.booking_id.as_str(),
            "Escalation notification sent"
        );
        true
    }
}
