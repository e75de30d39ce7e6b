//! Job payload schemas
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
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RidecoreError};

// ============================================================================
// Wallet Adjustment Job
// ============================================================================

/// Direction of a bulk wallet adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Add,
    Minus,
}

/// The admin request a bulk job was derived from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAdjustmentRequest {
    pub amount: Decimal,
    pub reason: Option<String>,
    pub adjustment_type: AdjustmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<bool>,
}

/// One driver inside a bulk wallet job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDriver {
    pub driver_id: String,
    pub wallet_id: String,
    pub admin_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}

/// Position of this message within a partitioned bulk request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobChunk {
    pub index: u32,
    pub size: u32,
    pub total: u32,
}

/// Payload published to `driver.wallet.bulk`.
///
/// Produced by the admin bulk-action endpoint, already partitioned into
/// fixed-size driver sub-batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAdjustmentJob {
    pub job_id: String,
    pub admin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<JobChunk>,
    pub request: WalletAdjustmentRequest,
    pub drivers: Vec<JobDriver>,
}

impl WalletAdjustmentJob {
    /// A job with no drivers or a non-positive amount must be rejected
    /// before any side effect.
    pub fn validate(&self) -> Result<()> {
        if self.drivers.is_empty() {
            return Err(RidecoreError::Validation("empty driver list".to_string()));
        }
        if self.request.amount <= Decimal::ZERO {
            return Err(RidecoreError::Validation(format!(
                "non-positive amount {}",
                self.request.amount
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Push Notification Jobs
// ============================================================================

/// Routing identifiers attached to a push job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

/// Payload carried inside a push job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub ids: PushIds,
}

/// Payload published to `notification.fcm.<audience>`.
///
/// Carries either a single device token or a token list, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_tokens: Option<Vec<String>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PushPayload>,
}

impl PushJob {
    /// Whether the job carries enough to be dispatched at all.
    pub fn is_deliverable(&self) -> bool {
        let has_token = self.fcm_token.is_some()
            || self.fcm_tokens.as_ref().is_some_and(|t| !t.is_empty());
        has_token && self.payload.is_some()
    }
}

// ============================================================================
// WhatsApp Job
// ============================================================================

/// A template variable for a WhatsApp message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppVariable {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl WhatsAppVariable {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: value.into(),
        }
    }
}

/// Payload published to `notification.whatsapp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppJob {
    pub phone: String,
    pub variables: Vec<WhatsAppVariable>,
    pub template_name: String,
}

// ============================================================================
// Admin Escalation Alert
// ============================================================================

/// Payload published to `notification.admin` by the escalation scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAlertJob {
    pub admin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub read: bool,
    pub date: DateTime<Utc>,
    pub time: String,
}

// ============================================================================
// Domain enums shared with the booking subsystem
// ============================================================================

/// Booking status subset relevant to escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    BookingConfirmed,
    NotStarted,
    Started,
    Completed,
    Cancelled,
}

/// Driver acceptance state on a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverAcceptance {
    Pending,
    Accepted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_driver() -> JobDriver {
        JobDriver {
            driver_id: "D1".to_string(),
            wallet_id: "W1".to_string(),
            admin_id: "A1".to_string(),
            name: Some("Ravi".to_string()),
            phone: Some("9000000001".to_string()),
            fcm_token: None,
        }
    }

    #[test]
    fn test_wallet_job_validation() {
        let mut job = WalletAdjustmentJob {
            job_id: "job-1".to_string(),
            admin_id: "A1".to_string(),
            chunk: None,
            request: WalletAdjustmentRequest {
                amount: Decimal::from(100),
                reason: None,
                adjustment_type: AdjustmentType::Add,
                days: None,
                status_filter: None,
            },
            drivers: vec![sample_driver()],
        };
        assert!(job.validate().is_ok());

        job.request.amount = Decimal::ZERO;
        assert!(job.validate().is_err());

        job.request.amount = Decimal::from(50);
        job.drivers.clear();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_wallet_job_wire_format() {
        let raw = r#"{
            "jobId": "job-9",
            "adminId": "A1",
            "chunk": {"index": 0, "size": 25, "total": 2},
            "request": {"amount": 100, "reason": "bonus", "adjustmentType": "add"},
            "drivers": [{"driverId": "D1", "walletId": "W1", "adminId": "A1", "name": "Ravi", "phone": "9000000001"}]
        }"#;

        let job: WalletAdjustmentJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.request.adjustment_type, AdjustmentType::Add);
        assert_eq!(job.request.amount, Decimal::from(100));
        assert_eq!(job.drivers[0].wallet_id, "W1");
        assert_eq!(job.chunk.unwrap().total, 2);
    }

    #[test]
    fn test_push_job_deliverability() {
        let mut job = PushJob {
            fcm_token: Some("tok".to_string()),
            fcm_tokens: None,
            kind: Some("payment".to_string()),
            payload: Some(PushPayload::default()),
        };
        assert!(job.is_deliverable());

        job.fcm_token = None;
        assert!(!job.is_deliverable());

        job.fcm_tokens = Some(vec![]);
        assert!(!job.is_deliverable());

        job.fcm_tokens = Some(vec!["a".to_string()]);
        assert!(job.is_deliverable());

        job.payload = None;
        assert!(!job.is_deliverable());
    }

    #[test]
    fn test_whatsapp_job_serialization() {
        let job = WhatsAppJob {
            phone: "919000000001".to_string(),
            variables: vec![WhatsAppVariable::text("482913")],
            template_name: "otp".to_string(),
        };

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["templateName"], "otp");
        assert_eq!(json["variables"][0]["type"], "text");
    }
}
