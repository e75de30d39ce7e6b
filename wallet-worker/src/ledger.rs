//! Row-locked wallet mutations and the append-only ledger
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


use chrono::{DateTime, Utc};
use rand::Rng;
use ridecore_types::{AdjustmentType, JobDriver, WalletAdjustmentRequest};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

/// New wallet figures computed from one adjustment.
///
/// `total_amount` is the running signed sum; it is persisted as text so
/// many adjustments cannot accumulate floating drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletFigures {
    pub previous_balance: Decimal,
    pub balance: Decimal,
    pub plus_amount: Decimal,
    pub minus_amount: Decimal,
    pub total_amount: Decimal,
    pub prefix: &'static str,
}

/// Compute the post-adjustment wallet figures.
///
/// The amount is an unsigned magnitude; direction comes only from the
/// adjustment type.
pub fn apply_adjustment(
    balance: Decimal,
    plus_amount: Decimal,
    minus_amount: Decimal,
    total_amount: Decimal,
    amount: Decimal,
    adjustment: AdjustmentType,
) -> WalletFigures {
    match adjustment {
        AdjustmentType::Add => WalletFigures {
            previous_balance: balance,
            balance: balance + amount,
            plus_amount: plus_amount + amount,
            minus_amount,
            total_amount: total_amount + amount,
            prefix: "+",
        },
        AdjustmentType::Minus => WalletFigures {
            previous_balance: balance,
            balance: balance - amount,
            plus_amount,
            minus_amount: minus_amount + amount,
            total_amount: total_amount - amount,
            prefix: "-",
        },
    }
}

/// Ledger transaction id: `Txn-<6 uppercase alphanumerics>_<UTC stamp>`
pub fn generate_transaction_id(now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let tag: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("Txn-{}_{}", tag, now.format("%Y%m%d%H%M%S%3f"))
}

/// What one committed adjustment produced
#[derive(Debug, Clone)]
pub struct AdjustmentReceipt {
    pub driver_id: String,
    pub transaction_id: String,
    pub previous_balance: Decimal,
    pub post_balance: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    balance: Decimal,
    plus_amount: Decimal,
    minus_amount: Decimal,
    total_amount: Option<String>,
}

/// Applies wallet adjustments transactionally and records ledger rows
pub struct WalletLedger {
    pool: PgPool,
}

impl WalletLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the admin's display name for ledger attribution
    pub async fn admin_display_name(&self, admin_id: &str) -> anyhow::Result<Option<String>> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM admins WHERE admin_id = $1")
                .bind(admin_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name)
    }

    /// Apply one driver's adjustment atomically.
    ///
    /// The wallet row is locked for the duration of the transaction, so a
    /// bulk adjustment racing a trip settlement on the same wallet
    /// serializes instead of losing an update. The ledger row commits in
    /// the same transaction: it can never exist without its balance
    /// change, and vice versa.
    ///
    /// Returns `Ok(None)` when the driver has no wallet row; `Err` means
    /// the transaction rolled back and only this driver was affected.
    pub async fn apply(
        &self,
        driver: &JobDriver,
        request: &WalletAdjustmentRequest,
        admin_name: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AdjustmentReceipt>> {
        if driver.wallet_id.is_empty() {
            warn!(driver_id = driver.driver_id.as_str(), "Driver has no wallet id, skipping");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let wallet: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT balance, plus_amount, minus_amount, total_amount
            FROM driver_wallets
            WHERE wallet_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&driver.wallet_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(wallet) = wallet else {
            warn!(
                driver_id = driver.driver_id.as_str(),
                wallet_id = driver.wallet_id.as_str(),
                "Wallet row not found, skipping"
            );
            tx.rollback().await?;
            return Ok(None);
        };

        let total_amount = wallet
            .total_amount
            .as_deref()
            .and_then(|t| t.parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO);

        let figures = apply_adjustment(
            wallet.balance,
            wallet.plus_amount,
            wallet.minus_amount,
            total_amount,
            request.amount,
            request.adjustment_type,
        );

        sqlx::query(
            r#"
            UPDATE driver_wallets
            SET balance = $1, plus_amount = $2, minus_amount = $3, total_amount = $4
            WHERE wallet_id = $5
            "#,
        )
        .bind(figures.balance)
        .bind(figures.plus_amount)
        .bind(figures.minus_amount)
        .bind(figures.total_amount.to_string())
        .bind(&driver.wallet_id)
        .execute(&mut *tx)
        .await?;

        let transaction_id = generate_transaction_id(now);
        let is_credit = request.adjustment_type == AdjustmentType::Add;

        let driver_name = format!(
            "{} {}",
            driver.name.as_deref().unwrap_or(""),
            driver.phone.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();
        let initiated_to = if driver_name.is_empty() {
            driver.driver_id.clone()
        } else {
            driver_name
        };

        let description = request.reason.clone().unwrap_or_else(|| {
            if is_credit {
                "Wallet amount added".to_string()
            } else {
                "Wallet amount subtracted".to_string()
            }
        });

        let fare_breakdown = json!({
            "previousBalance": figures.previous_balance,
            "amount": request.amount,
            "prefix": figures.prefix,
            "postBalance": figures.balance,
        });

        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (admin_id, transaction_id, initiated_by, initiated_to, amount, type,
                 date, payment_method, status, is_show, description, driver_id,
                 owned_by, remark, fare_breakdown)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'AdminBulk', 'Success', TRUE, $8, $9,
                    'Driver', $10, $11)
            "#,
        )
        .bind(&driver.admin_id)
        .bind(&transaction_id)
        .bind(admin_name)
        .bind(&initiated_to)
        .bind(request.amount)
        .bind(if is_credit { "Credit" } else { "Debit" })
        .bind(now)
        .bind(&description)
        .bind(&driver.driver_id)
        .bind(request.reason.as_deref())
        .bind(&fare_breakdown)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(AdjustmentReceipt {
            driver_id: driver.driver_id.clone(),
            transaction_id,
            previous_balance: figures.previous_balance,
            post_balance: figures.balance,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn test_credit_adjustment() {
        let figures = apply_adjustment(
            dec(50),
            dec(200),
            dec(30),
            dec(170),
            dec(100),
            AdjustmentType::Add,
        );
        assert_eq!(figures.previous_balance, dec(50));
        assert_eq!(figures.balance, dec(150));
        assert_eq!(figures.plus_amount, dec(300));
        assert_eq!(figures.minus_amount, dec(30));
        assert_eq!(figures.total_amount, dec(270));
        assert_eq!(figures.prefix, "+");
    }

    #[test]
    fn test_debit_adjustment() {
        let figures = apply_adjustment(
            dec(50),
            dec(200),
            dec(30),
            dec(170),
            dec(80),
            AdjustmentType::Minus,
        );
        assert_eq!(figures.balance, dec(-30));
        assert_eq!(figures.plus_amount, dec(200));
        assert_eq!(figures.minus_amount, dec(110));
        assert_eq!(figures.total_amount, dec(90));
        assert_eq!(figures.prefix, "-");
    }

    #[test]
    fn test_decimal_amounts_do_not_drift() {
        let mut balance = Decimal::ZERO;
        let amount: Decimal = "0.10".parse().unwrap();
        for _ in 0..1000 {
            let figures = apply_adjustment(
                balance,
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO,
                amount,
                AdjustmentType::Add,
            );
            balance = figures.balance;
        }
        assert_eq!(balance, "100.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_applying_twice_doubles_the_change() {
        // Redelivered jobs carry no idempotency key: the second delivery
        // applies again. Pinned here so a future dedup guard is a
        // deliberate behavior change.
        let first = apply_adjustment(
            dec(50),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            dec(100),
            AdjustmentType::Add,
        );
        let second = apply_adjustment(
            first.balance,
            first.plus_amount,
            first.minus_amount,
            first.total_amount,
            dec(100),
            AdjustmentType::Add,
        );
        assert_eq!(second.balance, dec(250));
        assert_eq!(second.plus_amount, dec(200));
    }

    #[test]
    fn test_transaction_id_format() {
        let now = Utc::now();
        let id = generate_transaction_id(now);
        assert!(id.starts_with("Txn-"));

        let rest = id.strip_prefix("Txn-").unwrap();
        let (tag, stamp) = rest.split_once('_').unwrap();
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(stamp.len(), 17);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }
}
