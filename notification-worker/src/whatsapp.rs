//! WhatsApp template delivery
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


use ridecore_config::WhatsAppConfig;
use ridecore_types::WhatsAppJob;
use serde_json::json;
use tracing::{info, warn};

/// Map a logical template name carried in a job to the provider's
/// template identifier. Unknown names are rejected before any HTTP call.
pub fn provider_template(name: &str) -> Option<&'static str> {
    match name {
        "otp" => Some("login_app"),
        "trip_otp" => Some("ride_otp"),
        "trip_cancelled" => Some("trip_cancellation"),
        "driver_trip_cancelled" => Some("driver_trip_cancelled_sms"),
        "driver_trip_completed" => Some("to_driver_trip_completed_sms"),
        "driver_trip_accepted" => Some("driver_trip_accepted"),
        "trip_completed" => Some("trip_completed_sms_customer"),
        "booking_confirmed" => Some("customer_booking"),
        "driver_details" => Some("driver_details"),
        _ => None,
    }
}

/// WhatsApp Business API client
pub struct WhatsAppClient {
    http: reqwest::Client,
    cfg: Option<WhatsAppConfig>,
}

impl WhatsAppClient {
    pub fn new(cfg: Option<WhatsAppConfig>) -> Self {
        if cfg.is_none() {
            warn!("WhatsApp provider not configured, template messages will be dropped");
        }
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    /// Deliver one template message; unknown templates are dropped
    pub async fn send_template(&self, job: &WhatsAppJob) -> anyhow::Result<()> {
        let Some(cfg) = &self.cfg else {
            warn!(template = job.template_name.as_str(), "WhatsApp not configured, dropping");
            return Ok(());
        };

        let Some(template) = provider_template(&job.template_name) else {
            warn!(template = job.template_name.as_str(), "Unknown WhatsApp template, dropping");
            return Ok(());
        };

        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": job.phone,
            "type": "template",
            "template": {
                "name": template,
                "language": { "code": "en" },
                "components": [
                    {
                        "type": "body",
                        "parameters": job.variables,
                    }
                ]
            }
        });

        let url = format!("{}/v3/{}/messages", cfg.api_url, cfg.phone_number_id);
        let response = self
            .http
            .post(&url)
            .header("apiKey", &cfg.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("WhatsApp provider returned {status}");
        }

        info!(template, "WhatsApp message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridecore_types::WhatsAppVariable;

    #[test]
    fn test_template_registry() {
        assert_eq!(provider_template("otp"), Some("login_app"));
        assert_eq!(provider_template("trip_otp"), Some("ride_otp"));
        assert_eq!(provider_template("made_up"), None);
    }

    #[tokio::test]
    async fn test_unconfigured_client_drops_without_error() {
        let client = WhatsAppClient::new(None);
        let job = WhatsAppJob {
            phone: "919000000001".to_string(),
            variables: vec![WhatsAppVariable::text("482913")],
            template_name: "otp".to_string(),
        };
        assert!(client.send_template(&job).await.is_ok());
    }
}
