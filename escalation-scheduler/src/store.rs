//! Booking, driver, and tariff state queries for escalation jobs
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


use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Booking subset the escalation jobs read
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EscalationBooking {
    pub booking_id: String,
    pub admin_id: String,
    pub pickup: Option<String>,
    pub drop_location: Option<String>,
    pub request_sent_time: Option<DateTime<Utc>>,
    pub last_admin_notify_time: Option<DateTime<Utc>>,
    pub pickup_date_time: Option<DateTime<Utc>>,
}

/// Driver subset for the document expiry check
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DriverDocRow {
    pub driver_id: String,
    pub admin_id: String,
    pub name: Option<String>,
    pub license_validity: Option<DateTime<Utc>>,
    pub fcm_token: Option<String>,
}

/// Vehicle document subset for the document expiry check
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VehicleDocRow {
    pub driver_id: String,
    pub vehicle_number: Option<String>,
    pub rc_expiry_date: Option<DateTime<Utc>>,
    pub insurance_expiry_date: Option<DateTime<Utc>>,
    pub pollution_expiry_date: Option<DateTime<Utc>>,
}

/// A scheduled tariff price delta
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceChangeRow {
    pub price_change_id: String,
    pub service_id: String,
    pub price: Decimal,
    pub applied: bool,
}

/// Read/write access to the state the escalation jobs watch
pub struct EscalationStore {
    pool: PgPool,
}

impl EscalationStore {
    pub async fn new(pool: PgPool) -> Result<Self> {
        // The notifications table is shared with the notification worker;
        // creating it is idempotent on both sides.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                notification_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                admin_id TEXT,
                driver_id TEXT,
                customer_id TEXT,
                vendor_id TEXT,
                owned_by VARCHAR(16) NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                type VARCHAR(32) NOT NULL,
                read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("Escalation store initialized");
        Ok(Self { pool })
    }

    /// Bookings still waiting on driver acceptance: directly-assigned
    /// drivers and the open assign-all pool alike. Threshold filtering
    /// happens in the job so the dedup predicate stays testable.
    pub async fn pending_acceptance_bookings(&self) -> Result<Vec<EscalationBooking>> {
        let rows = sqlx::query_as::<_, EscalationBooking>(
            r#"
            SELECT booking_id, admin_id, pickup, drop_location,
                   request_sent_time, last_admin_notify_time, pickup_date_time
            FROM bookings
            WHERE driver_accepted = 'pending'
              AND (driver_id IS NOT NULL OR assign_all_driver = TRUE)
              AND request_sent_time IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Bookings past pickup that never started but do have a start OTP
    pub async fn overdue_pickups(&self, now: DateTime<Utc>) -> Result<Vec<EscalationBooking>> {
        let rows = sqlx::query_as::<_, EscalationBooking>(
            r#"
            SELECT booking_id, admin_id, pickup, drop_location,
                   request_sent_time, last_admin_notify_time, pickup_date_time
            FROM bookings
            WHERE status <> 'Started'
              AND start_otp IS NOT NULL
              AND driver_id IS NOT NULL
              AND pickup_date_time <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stamp the dedup gate. The guard keeps it monotonically
    /// non-decreasing even if two scheduler instances race.
    pub async fn stamp_admin_notify(&self, booking_id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET last_admin_notify_time = $2
            WHERE booking_id = $1
              AND (last_admin_notify_time IS NULL OR last_admin_notify_time < $2)
            "#,
        )
        .bind(booking_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist an admin notification row and return its id
    pub async fn insert_admin_notification(
        &self,
        admin_id: &str,
        title: &str,
        description: &str,
    ) -> Result<Uuid> {
        let notification_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (admin_id, owned_by, title, message, type)
            VALUES ($1, 'Admin', $2, $3, 'booking')
            RETURNING notification_id
            "#,
        )
        .bind(admin_id)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(notification_id)
    }

    /// Active drivers for the document expiry check
    pub async fn active_drivers(&self) -> Result<Vec<DriverDocRow>> {
        let rows = sqlx::query_as::<_, DriverDocRow>(
            r#"
            SELECT driver_id, admin_id, name, license_validity, fcm_token
            FROM drivers
            WHERE is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Active vehicles across all drivers, grouped by the caller
    pub async fn active_vehicles(&self) -> Result<Vec<VehicleDocRow>> {
        let rows = sqlx::query_as::<_, VehicleDocRow>(
            r#"
            SELECT driver_id, vehicle_number, rc_expiry_date,
                   insurance_expiry_date, pollution_expiry_date
            FROM vehicles
            WHERE is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Freshest cached device token for a driver, if any
    pub async fn fresh_driver_token(
        &self,
        admin_id: &str,
        driver_id: &str,
    ) -> Result<Option<String>> {
        let token: Option<String> = sqlx::query_scalar(
            r#"
            SELECT fcm_token FROM device_tokens
            WHERE admin_id = $1 AND driver_id = $2
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(admin_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or(None);

        Ok(token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
    }

    /// Price deltas whose start date has arrived
    pub async fn price_changes_due(&self, now: DateTime<Utc>) -> Result<Vec<PriceChangeRow>> {
        let rows = sqlx::query_as::<_, PriceChangeRow>(
            r#"
            SELECT price_change_id, service_id, price, applied
            FROM price_changes
            WHERE from_date <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Applied price deltas whose end date has passed
    pub async fn price_changes_expired(&self, now: DateTime<Utc>) -> Result<Vec<PriceChangeRow>> {
        let rows = sqlx::query_as::<_, PriceChangeRow>(
            r#"
            SELECT price_change_id, service_id, price, applied
            FROM price_changes
            WHERE to_date <= $1 AND applied = TRUE
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Apply a delta to every tariff of its service and mark it applied
    pub async fn apply_price_change(&self, change: &PriceChangeRow) -> Result<()> {
        sqlx::query("UPDATE tariffs SET increased_price = $1 WHERE service_id = $2")
            .bind(change.price)
            .bind(&change.service_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE price_changes SET applied = TRUE WHERE price_change_id = $1")
            .bind(&change.price_change_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Zero the delta back out and delete the exhausted record
    pub async fn revert_price_change(&self, change: &PriceChangeRow) -> Result<()> {
        sqlx::query("UPDATE tariffs SET increased_price = 0 WHERE service_id = $1")
            .bind(&change.service_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM price_changes WHERE price_change_id = $1")
            .bind(&change.price_change_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
