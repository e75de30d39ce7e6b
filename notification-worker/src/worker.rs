//! Notification Worker - Job Dispatch
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


use crate::database::{NotificationOwner, NotificationStore};
use crate::sender::{PushNote, PushSender};
use crate::whatsapp::WhatsAppClient;
use broker_client::{BrokerClient, MessageHandler};
use ridecore_types::{Audience, Exchange, PushJob, PushPayload, RoutingKey, WhatsAppJob};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Notification worker that routes queued push/WhatsApp jobs to
/// per-audience handlers.
pub struct NotificationWorker {
    broker: Arc<dyn BrokerClient>,
    sender: Arc<PushSender>,
    whatsapp: Arc<WhatsAppClient>,
    store: Arc<NotificationStore>,
}

impl NotificationWorker {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        sender: Arc<PushSender>,
        whatsapp: Arc<WhatsAppClient>,
        store: Arc<NotificationStore>,
    ) -> Self {
        Self {
            broker,
            sender,
            whatsapp,
            store,
        }
    }

    /// Register the worker's consumers on the broker
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!("Subscribing to notification.fcm.* and notification.whatsapp");

        let worker = Arc::clone(&self);
        let fcm_handler: MessageHandler = Arc::new(move |payload, key| {
            let worker = Arc::clone(&worker);
            Box::pin(async move { worker.handle_fcm(payload, key).await })
        });
        self.broker
            .consume(Exchange::Notification, "notification.fcm.*", fcm_handler)
            .await?;

        let worker = Arc::clone(&self);
        let whatsapp_handler: MessageHandler = Arc::new(move |payload, _key| {
            let worker = Arc::clone(&worker);
            Box::pin(async move { worker.handle_whatsapp(payload).await })
        });
        self.broker
            .consume(Exchange::Notification, "notification.whatsapp", whatsapp_handler)
            .await?;

        Ok(())
    }

    /// Route one push job to its audience handler.
    ///
    /// Malformed jobs are dropped, not nacked into a retry storm: bad
    /// producer data cannot be fixed by redelivery.
    async fn handle_fcm(&self, payload: serde_json::Value, key: RoutingKey) -> anyhow::Result<()> {
        let audience = match key {
            RoutingKey::NotificationFcm(audience) => audience,
            other => {
                warn!(routing_key = %other, "Unknown notification target, dropping");
                return Ok(());
            }
        };

        let job: PushJob = match serde_json::from_value(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(audience = audience.as_str(), error = %e, "Malformed push job, dropping");
                return Ok(());
            }
        };

        if !job.is_deliverable() {
            debug!(audience = audience.as_str(), "Push job missing token or payload, dropping");
            return Ok(());
        }

        info!(audience = audience.as_str(), kind = ?job.kind, "Push job received");

        match audience {
            Audience::Driver => self.handle_single_push(job, NotificationOwner::Driver).await,
            Audience::Customer => {
                self.handle_single_push(job, NotificationOwner::Customer).await
            }
            Audience::Vendor => self.handle_single_push(job, NotificationOwner::Vendor).await,
            Audience::Batch => self.handle_batch_push(job).await,
        }

        Ok(())
    }

    /// Persist the notification row, resolve the live token, send.
    ///
    /// Provider and database failures are logged with the owning id and
    /// swallowed: push delivery is outside every primary operation's
    /// consistency boundary.
    async fn handle_single_push(&self, job: PushJob, owner: NotificationOwner) {
        let payload = job.payload.unwrap_or_default();
        let kind = job.kind.as_deref().unwrap_or("general");
        let note = build_note(owner, kind, &payload);

        let owner_id = match owner {
            NotificationOwner::Driver => payload.ids.driver_id.as_deref(),
            NotificationOwner::Customer => payload.ids.customer_id.as_deref(),
            NotificationOwner::Vendor => payload.ids.vendor_id.as_deref(),
            NotificationOwner::Admin => payload.ids.admin_id.as_deref(),
        };

        if let Err(e) = self
            .store
            .insert_notification(
                owner,
                payload.ids.admin_id.as_deref(),
                owner_id,
                &note.title,
                &note.message,
                &note.kind,
            )
            .await
        {
            error!(owner_id = ?owner_id, error = %e, "Failed to persist notification row");
            return;
        }

        let token = self
            .resolve_token(owner, &payload, job.fcm_token.as_deref())
            .await;
        let Some(token) = token else {
            debug!(owner_id = ?owner_id, "No device token available, push skipped");
            return;
        };

        if let Err(e) = self.sender.send_to_token(&token, &note, &payload.ids).await {
            error!(owner_id = ?owner_id, error = %e, "Push send failed");
        }
    }

    /// Batch jobs fan out to every token; per-token outcomes are counted
    async fn handle_batch_push(&self, job: PushJob) {
        let payload = job.payload.unwrap_or_default();
        let tokens = job.fcm_tokens.unwrap_or_default();
        let kind = job.kind.as_deref().unwrap_or("general");
        let note = build_note(NotificationOwner::Driver, kind, &payload);

        let outcome = self.sender.send_batch(&tokens, &note, &payload.ids).await;
        info!(
            success = outcome.success_count,
            failure = outcome.failure_count,
            "Batch push processed"
        );
    }

    /// Prefer a fresh cached token over the one embedded in the job
    async fn resolve_token(
        &self,
        owner: NotificationOwner,
        payload: &PushPayload,
        job_token: Option<&str>,
    ) -> Option<String> {
        if owner == NotificationOwner::Driver {
            if let (Some(admin_id), Some(driver_id)) =
                (payload.ids.admin_id.as_deref(), payload.ids.driver_id.as_deref())
            {
                match self.store.fresh_driver_token(admin_id, driver_id).await {
                    Ok(Some(token)) => return Some(token),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(driver_id, error = %e, "Token cache lookup failed, using job token");
                    }
                }
            }
        }
        job_token.map(str::to_string)
    }

    /// Validate and deliver one WhatsApp job
    async fn handle_whatsapp(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let job: WhatsAppJob = match serde_json::from_value(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Malformed WhatsApp job, dropping");
                return Ok(());
            }
        };

        if job.phone.is_empty() || job.variables.is_empty() || job.template_name.is_empty() {
            warn!("Missing required WhatsApp fields, dropping");
            return Ok(());
        }

        info!(template = job.template_name.as_str(), "WhatsApp job received");

        if let Err(e) = self.whatsapp.send_template(&job).await {
            error!(template = job.template_name.as_str(), error = %e, "WhatsApp send failed");
        }

        Ok(())
    }
}

/// Canonical title/message/channel for a job type and audience.
///
/// Unknown types fall back to the payload's own title and message.
pub fn build_note(owner: NotificationOwner, kind: &str, payload: &PushPayload) -> PushNote {
    let driver_name = payload.driver_name.as_deref().unwrap_or("Driver");

    let (title, message, channel_key) = match (owner, kind) {
        (NotificationOwner::Driver, "new-booking") => (
            "New Booking Arrived".to_string(),
            format!("Mr {driver_name}, you have received a new booking"),
            "booking_channel",
        ),
        (NotificationOwner::Driver, "payment") => (
            "Payment Received".to_string(),
            format!("Mr {driver_name}, you have received a payment"),
            "payment_channel",
        ),
        (NotificationOwner::Driver, "wallet") => (
            payload.title.clone().unwrap_or_else(|| "Wallet Update".to_string()),
            payload
                .message
                .clone()
                .unwrap_or_else(|| "Your wallet balance has changed.".to_string()),
            "other_channel",
        ),
        (NotificationOwner::Customer, "booking-confirmed") => (
            "Booking Confirmed".to_string(),
            "Your booking has been confirmed. Driver will arrive shortly".to_string(),
            "booking_channel",
        ),
        (NotificationOwner::Customer, "driver-arrived") => (
            "Driver Arrived".to_string(),
            "Your driver has arrived at the pickup location".to_string(),
            "trip_channel",
        ),
        (NotificationOwner::Customer, "payment") => (
            "Payment Processed".to_string(),
            "Your payment has been processed successfully".to_string(),
            "payment_channel",
        ),
        (NotificationOwner::Vendor, "new-booking") => (
            "New Booking Received".to_string(),
            "You have received a new booking request".to_string(),
            "booking_channel",
        ),
        (NotificationOwner::Vendor, "payment") => (
            "Payment Received".to_string(),
            "You have received a payment for your service".to_string(),
            "payment_channel",
        ),
        (NotificationOwner::Vendor, "commission") => (
            "Commission Update".to_string(),
            "Your commission has been updated".to_string(),
            "commission_channel",
        ),
        (_, "custom") => (
            payload.title.clone().unwrap_or_else(|| "Notification".to_string()),
            payload
                .message
                .clone()
                .unwrap_or_else(|| "You have a new notification.".to_string()),
            "others_channel",
        ),
        _ => (
            payload.title.clone().unwrap_or_else(|| "Notification".to_string()),
            payload
                .message
                .clone()
                .unwrap_or_else(|| "You have a new notification.".to_string()),
            "others_channel",
        ),
    };

    PushNote {
        title,
        message,
        kind: kind.to_string(),
        channel_key: channel_key.to_string(),
        image_url: payload.image_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridecore_types::PushIds;

    fn payload_with(title: Option<&str>, driver_name: Option<&str>) -> PushPayload {
        PushPayload {
            title: title.map(str::to_string),
            message: None,
            image_url: None,
            driver_name: driver_name.map(str::to_string),
            ids: PushIds::default(),
        }
    }

    #[test]
    fn test_driver_new_booking_note() {
        let note = build_note(
            NotificationOwner::Driver,
            "new-booking",
            &payload_with(None, Some("Ravi")),
        );
        assert_eq!(note.title, "New Booking Arrived");
        assert!(note.message.contains("Ravi"));
        assert_eq!(note.channel_key, "booking_channel");
    }

    #[test]
    fn test_custom_note_uses_payload() {
        let note = build_note(
            NotificationOwner::Customer,
            "custom",
            &payload_with(Some("Festive offer"), None),
        );
        assert_eq!(note.title, "Festive offer");
        assert_eq!(note.channel_key, "others_channel");
    }

    #[test]
    fn test_unknown_kind_falls_back() {
        let note = build_note(NotificationOwner::Vendor, "whatever", &payload_with(None, None));
        assert_eq!(note.title, "Notification");
        assert_eq!(note.message, "You have a new notification.");
    }

    #[test]
    fn test_wallet_note_keeps_producer_title() {
        let note = build_note(
            NotificationOwner::Driver,
            "wallet",
            &payload_with(Some("Wallet Credit : 100"), None),
        );
        assert_eq!(note.title, "Wallet Credit : 100");
        assert_eq!(note.channel_key, "other_channel");
    }
}
