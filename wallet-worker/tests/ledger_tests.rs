//! Wallet ledger integration tests
//!
//! These tests require:
//! - Postgres with the driver_wallets / wallet_transactions / admins tables

use chrono::Utc;
use ridecore_types::{AdjustmentType, JobDriver, WalletAdjustmentRequest};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use wallet_worker::ledger::WalletLedger;

async fn test_pool() -> PgPool {
    PgPoolOptions::new()
        .max_connections(5)
        .connect("postgres://localhost:5432/ridecore_test")
        .await
        .expect("Failed to connect to test database")
}

fn driver(wallet_id: &str) -> JobDriver {
    JobDriver {
        driver_id: "D1".to_string(),
        wallet_id: wallet_id.to_string(),
        admin_id: "A1".to_string(),
        name: Some("Ravi".to_string()),
        phone: Some("9000000001".to_string()),
        fcm_token: None,
    }
}

fn credit(amount: i64) -> WalletAdjustmentRequest {
    WalletAdjustmentRequest {
        amount: Decimal::from(amount),
        reason: Some("integration test".to_string()),
        adjustment_type: AdjustmentType::Add,
        days: None,
        status_filter: None,
    }
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn test_credit_updates_balance_and_writes_ledger_row() {
    let pool = test_pool().await;

    sqlx::query(
        "INSERT INTO driver_wallets (wallet_id, balance, plus_amount, minus_amount, total_amount)
         VALUES ('W-it-1', 50, 0, 0, '0')
         ON CONFLICT (wallet_id) DO UPDATE SET balance = 50, plus_amount = 0, minus_amount = 0, total_amount = '0'",
    )
    .execute(&pool)
    .await
    .unwrap();

    let ledger = WalletLedger::new(pool.clone());
    let receipt = ledger
        .apply(&driver("W-it-1"), &credit(100), "Ops Admin", Utc::now())
        .await
        .unwrap()
        .expect("wallet row exists");

    assert_eq!(receipt.previous_balance, Decimal::from(50));
    assert_eq!(receipt.post_balance, Decimal::from(150));

    let (balance, plus): (Decimal, Decimal) = sqlx::query_as(
        "SELECT balance, plus_amount FROM driver_wallets WHERE wallet_id = 'W-it-1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(balance, Decimal::from(150));
    assert_eq!(plus, Decimal::from(100));

    let post_balance: Decimal = sqlx::query_scalar(
        "SELECT (fare_breakdown->>'postBalance')::numeric FROM wallet_transactions
         WHERE transaction_id = $1",
    )
    .bind(&receipt.transaction_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(post_balance, receipt.post_balance);
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn test_redelivered_job_applies_twice() {
    // There is no job-level idempotency key: at-least-once redelivery
    // produces a second ledger entry and a second balance change. This is
    // the documented non-idempotent boundary of the wallet pipeline.
    let pool = test_pool().await;

    sqlx::query(
        "INSERT INTO driver_wallets (wallet_id, balance, plus_amount, minus_amount, total_amount)
         VALUES ('W-it-2', 0, 0, 0, '0')
         ON CONFLICT (wallet_id) DO UPDATE SET balance = 0, plus_amount = 0, minus_amount = 0, total_amount = '0'",
    )
    .execute(&pool)
    .await
    .unwrap();

    let ledger = WalletLedger::new(pool.clone());
    let d = driver("W-it-2");
    let request = credit(100);

    ledger.apply(&d, &request, "Ops Admin", Utc::now()).await.unwrap();
    ledger.apply(&d, &request, "Ops Admin", Utc::now()).await.unwrap();

    let balance: Decimal =
        sqlx::query_scalar("SELECT balance FROM driver_wallets WHERE wallet_id = 'W-it-2'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, Decimal::from(200));

    let ledger_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM wallet_transactions WHERE driver_id = 'D1' AND amount = 100",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(ledger_rows >= 2);
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn test_missing_wallet_is_skipped_without_ledger_row() {
    let pool = test_pool().await;
    let ledger = WalletLedger::new(pool.clone());

    let receipt = ledger
        .apply(&driver("W-does-not-exist"), &credit(100), "Ops Admin", Utc::now())
        .await
        .unwrap();
    assert!(receipt.is_none());
}
