//! External OTP-capable SMS provider client
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


use ridecore_config::SmsConfig;
use tracing::{info, warn};

use crate::error::{OtpError, Result};
use crate::service::VerifyOutcome;

/// Provider status code meaning the widget token was already verified.
/// Treated as success so client retries stay idempotent.
pub const ALREADY_VERIFIED_CODE: &str = "702";

/// HTTP client for the external SMS/OTP provider
pub struct SmsProvider {
    http: reqwest::Client,
    cfg: SmsConfig,
}

impl SmsProvider {
    pub fn new(cfg: SmsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    /// Send a plain SMS through the provider's GET endpoint
    pub async fn send_sms(&self, mobile: &str, message: &str) -> Result<()> {
        let url = format!("{}/api/v2/SendSMS", self.cfg.api_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("SenderId", self.cfg.sender_id.as_str()),
                ("Is_Unicode", "false"),
                ("Is_Flash", "false"),
                ("Message", message),
                ("MobileNumbers", mobile),
                ("ApiKey", self.cfg.api_key.as_str()),
                ("ClientId", self.cfg.client_id.as_str()),
            ])
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OtpError::Provider(format!(
                "SMS send returned {status}"
            )));
        }

        info!(mobile = mask_phone(mobile), "OTP SMS dispatched");
        Ok(())
    }

    /// Verify a widget/SDK access token against the provider.
    ///
    /// Provider code `702` ("already verified") counts as success.
    pub async fn verify_access_token(&self, access_token: &str) -> VerifyOutcome {
        let Some(verify_url) = self.cfg.verify_url.as_deref() else {
            return VerifyOutcome::failure(500, "Token verification endpoint not configured");
        };

        let response = self
            .http
            .post(verify_url)
            .header("authkey", &self.cfg.api_key)
            .json(&serde_json::json!({ "access-token": access_token }))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Access token verification request failed");
                return VerifyOutcome::failure(502, "Verification provider unreachable");
            }
        };

        let status = response.status();
        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Access token verification returned invalid body");
                return VerifyOutcome::failure(502, "Invalid provider response");
            }
        };

        let code = body["code"]
            .as_str()
            .map(str::to_string)
            .or_else(|| body["code"].as_i64().map(|c| c.to_string()));
        let message = body["message"]
            .as_str()
            .unwrap_or("Token verification failed")
            .to_string();

        let verified = status.is_success()
            && (body["type"].as_str() == Some("success")
                || code.as_deref() == Some(ALREADY_VERIFIED_CODE));

        if verified {
            VerifyOutcome {
                status: 200,
                success: true,
                message: "Token verified successfully".to_string(),
                id: None,
            }
        } else {
            warn!(code = ?code, message = message.as_str(), "Access token rejected by provider");
            VerifyOutcome::failure(401, &message)
        }
    }
}

fn mask_phone(mobile: &str) -> String {
    if mobile.len() <= 4 {
        return "****".to_string();
    }
    format!("******{}", &mobile[mobile.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("9000000001"), "******0001");
        assert_eq!(mask_phone("91"), "****");
    }
}
