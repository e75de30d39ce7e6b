//! Notification rows and the device token cache
//!
//! Persists per-audience notification rows before a push is attempted
//! and resolves the freshest device token for a driver, preferring the
//! cache over the possibly-stale value embedded in a job.
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
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Audience a notification row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOwner {
    Driver,
    Customer,
    Vendor,
    Admin,
}

impl NotificationOwner {
    fn id_column(&self) -> &'static str {
        match self {
            NotificationOwner::Driver => "driver_id",
            NotificationOwner::Customer => "customer_id",
            NotificationOwner::Vendor => "vendor_id",
            NotificationOwner::Admin => "admin_id",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            NotificationOwner::Driver => "Driver",
            NotificationOwner::Customer => "Customer",
            NotificationOwner::Vendor => "Vendor",
            NotificationOwner::Admin => "Admin",
        }
    }
}

/// Store for notification rows and the device token cache
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    pub async fn new(pool: PgPool) -> Result<Self> {
        Self::run_migrations(&pool).await?;
        info!("Notification store initialized");
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &PgPool) -> Result<()> {
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
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_notifications_owner
            ON notifications(owned_by, created_at)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_tokens (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                admin_id TEXT NOT NULL,
                driver_id TEXT NOT NULL,
                fcm_token TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE(admin_id, driver_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert a notification row; the returned id correlates the
    /// subsequent push with its persisted record.
    pub async fn insert_notification(
        &self,
        owner: NotificationOwner,
        admin_id: Option<&str>,
        owner_id: Option<&str>,
        title: &str,
        message: &str,
        kind: &str,
    ) -> Result<Uuid> {
        // Admin notifications key on admin_id alone; the other audiences
        // carry their own id column next to it.
        let notification_id: Uuid = if owner == NotificationOwner::Admin {
            sqlx::query_scalar(
                r#"
                INSERT INTO notifications (admin_id, owned_by, title, message, type)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING notification_id
                "#,
            )
            .bind(admin_id)
            .bind(owner.as_str())
            .bind(title)
            .bind(message)
            .bind(kind)
            .fetch_one(&self.pool)
            .await?
        } else {
            let sql = format!(
                r#"
                INSERT INTO notifications (admin_id, {owner_col}, owned_by, title, message, type)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING notification_id
                "#,
                owner_col = owner.id_column(),
            );
            sqlx::query_scalar(&sql)
                .bind(admin_id)
                .bind(owner_id)
                .bind(owner.as_str())
                .bind(title)
                .bind(message)
                .bind(kind)
                .fetch_one(&self.pool)
                .await?
        };

        Ok(notification_id)
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
        .await?;

        Ok(token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
    }

    /// Store or refresh a driver's device token
    pub async fn store_driver_token(
        &self,
        admin_id: &str,
        driver_id: &str,
        fcm_token: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_tokens (admin_id, driver_id, fcm_token, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (admin_id, driver_id)
            DO UPDATE SET fcm_token = EXCLUDED.fcm_token, updated_at = NOW()
            "#,
        )
        .bind(admin_id)
        .bind(driver_id)
        .bind(fcm_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
