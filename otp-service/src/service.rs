//! OTP service facade
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


use broker_client::BrokerClient;
use chrono::{DateTime, Utc};
use ridecore_config::{OtpConfig, SmsConfig};
use ridecore_types::{Exchange, RoutingKey, WhatsAppJob, WhatsAppVariable};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::envelope::{generate_otp, OtpEnvelope, OtpSealer, OTP_EXPIRY_MS};
use crate::error::Result;
use crate::provider::SmsProvider;
use crate::templates::{SmsTemplate, WA_TEMPLATE_OTP, WA_TEMPLATE_TRIP_OTP};

/// Code issued to the fixed development phone, bypassing the provider
pub const TEST_OTP: &str = "123456";

/// Typed verification result surfaced to HTTP handlers.
///
/// Failures are data, not panics, so handlers can map them straight onto
/// user-facing responses.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub status: u16,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl VerifyOutcome {
    pub fn failure(status: u16, message: &str) -> Self {
        Self {
            status,
            success: false,
            message: message.to_string(),
            id: None,
        }
    }
}

/// Request to generate (and optionally dispatch) an OTP
#[derive(Debug, Clone, Default)]
pub struct SendOtpRequest {
    pub mobile: String,
    /// When false, only the sealed token is produced; nothing is sent
    pub dispatch: bool,
    /// Caller-supplied code (trip flows resend a stored end-ride code)
    pub preset_otp: Option<String>,
    /// Requester id sealed into the envelope and echoed on verify
    pub requester_id: Option<String>,
    pub website_name: Option<String>,
}

/// What `send_otp` produced, per channel.
///
/// Token production is decoupled from channel delivery: an SMS failure
/// does not fail the request when WhatsApp already carried the code.
#[derive(Debug, Clone)]
pub struct SendOtpOutcome {
    pub token: String,
    pub whatsapp_sent: bool,
    pub sms_sent: bool,
}

/// Trip OTP dispatch summary
#[derive(Debug, Clone)]
pub struct TripOtpDispatch {
    pub whatsapp_sent: bool,
    pub sms_sent: bool,
}

/// OTP / trip-verification service
pub struct OtpService {
    broker: Arc<dyn BrokerClient>,
    provider: Option<SmsProvider>,
    sealer: OtpSealer,
    website_name: String,
    test_phone: Option<String>,
}

impl OtpService {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        otp_cfg: &OtpConfig,
        sms_cfg: Option<SmsConfig>,
    ) -> Self {
        let test_phone = sms_cfg.as_ref().and_then(|c| c.test_phone.clone());
        let provider = sms_cfg.map(SmsProvider::new);

        Self {
            broker,
            provider,
            sealer: OtpSealer::new(&otp_cfg.secret),
            website_name: otp_cfg.website_name.clone(),
            test_phone,
        }
    }

    /// Generate a code, seal it into an opaque token, and dispatch it when
    /// requested. WhatsApp delivery is always attempted (best-effort via
    /// the broker); the SMS provider is skipped for the fixed test phone.
    pub async fn send_otp(&self, req: SendOtpRequest) -> Result<SendOtpOutcome> {
        let is_test_phone = self.test_phone.as_deref() == Some(req.mobile.as_str());

        let otp = if is_test_phone {
            TEST_OTP.to_string()
        } else {
            req.preset_otp.clone().unwrap_or_else(generate_otp)
        };

        let envelope = OtpEnvelope {
            otp: otp.clone(),
            expires_at: Utc::now().timestamp_millis() + OTP_EXPIRY_MS,
            id: req.requester_id.clone(),
            website_name: Some(
                req.website_name
                    .clone()
                    .unwrap_or_else(|| self.website_name.clone()),
            ),
        };
        let token = self.sealer.seal(&envelope)?;

        if !req.dispatch {
            return Ok(SendOtpOutcome {
                token,
                whatsapp_sent: false,
                sms_sent: false,
            });
        }

        let wa_job = WhatsAppJob {
            phone: req.mobile.clone(),
            variables: vec![WhatsAppVariable::text(&otp)],
            template_name: WA_TEMPLATE_OTP.to_string(),
        };
        let whatsapp_sent = self
            .broker
            .publish_best_effort(
                Exchange::Notification,
                &RoutingKey::NotificationWhatsapp,
                &serde_json::to_value(&wa_job)?,
            )
            .await;

        if is_test_phone {
            info!("Test phone OTP request, skipping SMS provider");
            return Ok(SendOtpOutcome {
                token,
                whatsapp_sent,
                sms_sent: false,
            });
        }

        let message = SmsTemplate::DriverOtp { otp: &otp }.render(&self.website_name);
        let sms_sent = match &self.provider {
            Some(provider) => match provider.send_sms(&req.mobile, &message).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "OTP SMS send failed");
                    false
                }
            },
            None => {
                warn!("SMS provider not configured, OTP delivered over WhatsApp only");
                false
            }
        };

        Ok(SendOtpOutcome {
            token,
            whatsapp_sent,
            sms_sent,
        })
    }

    /// Verify a code against its sealed token
    pub fn verify_otp(&self, otp: &str, token: &str) -> VerifyOutcome {
        self.verify_otp_at(otp, token, Utc::now())
    }

    pub fn verify_otp_at(&self, otp: &str, token: &str, now: DateTime<Utc>) -> VerifyOutcome {
        let envelope = match self.sealer.open(token) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "OTP token rejected");
                return VerifyOutcome::failure(400, "Invalid token format");
            }
        };

        if envelope.is_expired(now) {
            return VerifyOutcome::failure(410, "OTP expired");
        }

        if envelope.otp == otp {
            VerifyOutcome {
                status: 200,
                success: true,
                message: "OTP verified successfully".to_string(),
                id: envelope.id,
            }
        } else {
            VerifyOutcome::failure(401, "Invalid OTP")
        }
    }

    /// Verify a pre-verified client-SDK access token against the provider
    pub async fn verify_access_token(&self, access_token: &str) -> VerifyOutcome {
        match &self.provider {
            Some(provider) => provider.verify_access_token(access_token).await,
            None => VerifyOutcome::failure(500, "SMS provider not configured"),
        }
    }

    /// Fresh start/end codes for a trip; never reuses the login OTP
    pub fn generate_trip_otps() -> (String, String) {
        (generate_otp(), generate_otp())
    }

    /// Deliver a trip's start/end codes to the customer.
    ///
    /// The WhatsApp payload carries the booking id so operators can audit
    /// which trip a code belongs to.
    pub async fn send_trip_otp(
        &self,
        booking_id: &str,
        phone: &str,
        start_otp: &str,
        end_otp: &str,
    ) -> Result<TripOtpDispatch> {
        let wa_job = WhatsAppJob {
            phone: phone.to_string(),
            variables: vec![
                WhatsAppVariable::text(booking_id),
                WhatsAppVariable::text(start_otp),
                WhatsAppVariable::text(end_otp),
            ],
            template_name: WA_TEMPLATE_TRIP_OTP.to_string(),
        };
        let whatsapp_sent = self
            .broker
            .publish_best_effort(
                Exchange::Notification,
                &RoutingKey::NotificationWhatsapp,
                &serde_json::to_value(&wa_job)?,
            )
            .await;

        let message = SmsTemplate::CustomerTripOtp { start_otp, end_otp }.render(&self.website_name);
        let sms_sent = match &self.provider {
            Some(provider) => match provider.send_sms(phone, &message).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(booking_id, error = %e, "Trip OTP SMS send failed");
                    false
                }
            },
            None => false,
        };

        Ok(TripOtpDispatch {
            whatsapp_sent,
            sms_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_client::MemoryBroker;

    fn test_service(broker: Arc<MemoryBroker>, test_phone: Option<&str>) -> OtpService {
        let otp_cfg = OtpConfig {
            secret: "unit-test-secret".to_string(),
            website_name: "RideCore".to_string(),
        };
        let sms_cfg = test_phone.map(|phone| SmsConfig {
            api_url: "http://localhost:9".to_string(),
            api_key: "key".to_string(),
            client_id: "client".to_string(),
            sender_id: "RIDECO".to_string(),
            verify_url: None,
            test_phone: Some(phone.to_string()),
        });
        OtpService::new(broker, &otp_cfg, sms_cfg)
    }

    #[tokio::test]
    async fn test_token_only_request_sends_nothing() {
        let broker = Arc::new(MemoryBroker::new());
        let service = test_service(Arc::clone(&broker), None);

        let outcome = service
            .send_otp(SendOtpRequest {
                mobile: "9000000001".to_string(),
                dispatch: false,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!outcome.whatsapp_sent);
        assert!(!outcome.sms_sent);
        assert!(broker.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_test_phone_always_verifies_with_fixed_code() {
        let broker = Arc::new(MemoryBroker::new());
        let service = test_service(Arc::clone(&broker), Some("9361060911"));

        // Provider is unreachable (port 9) but the test phone never calls it
        let outcome = service
            .send_otp(SendOtpRequest {
                mobile: "9361060911".to_string(),
                dispatch: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!outcome.sms_sent);
        assert!(outcome.whatsapp_sent);

        let verdict = service.verify_otp(TEST_OTP, &outcome.token);
        assert!(verdict.success);
        assert_eq!(verdict.status, 200);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_code_and_expired_token() {
        let broker = Arc::new(MemoryBroker::new());
        let service = test_service(Arc::clone(&broker), None);

        let outcome = service
            .send_otp(SendOtpRequest {
                mobile: "9000000001".to_string(),
                dispatch: false,
                preset_otp: Some("482913".to_string()),
                requester_id: Some("D7".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let wrong = service.verify_otp("000000", &outcome.token);
        assert!(!wrong.success);
        assert_eq!(wrong.status, 401);

        let ok = service.verify_otp("482913", &outcome.token);
        assert!(ok.success);
        assert_eq!(ok.id.as_deref(), Some("D7"));

        let after_expiry = Utc::now() + chrono::Duration::milliseconds(OTP_EXPIRY_MS + 1000);
        let expired = service.verify_otp_at("482913", &outcome.token, after_expiry);
        assert!(!expired.success);
        assert_eq!(expired.status, 410);
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage_token() {
        let broker = Arc::new(MemoryBroker::new());
        let service = test_service(broker, None);

        let verdict = service.verify_otp("123456", "AAAA////");
        assert!(!verdict.success);
        assert_eq!(verdict.status, 400);
    }

    #[tokio::test]
    async fn test_trip_otp_publishes_booking_bound_whatsapp_job() {
        let broker = Arc::new(MemoryBroker::new());
        let service = test_service(Arc::clone(&broker), None);

        let (start, end) = OtpService::generate_trip_otps();

        service
            .send_trip_otp("BK-1001", "919000000001", &start, &end)
            .await
            .unwrap();

        let published = broker.published_to("notification.whatsapp").await;
        assert_eq!(published.len(), 1);
        let payload = &published[0].payload;
        assert_eq!(payload["templateName"], "trip_otp");
        assert_eq!(payload["variables"][0]["text"], "BK-1001");
    }
}
