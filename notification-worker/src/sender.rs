//! Push notification sender
//!
//! Talks to the push provider's single-token HTTP endpoint and fans out
//! batch sends, collecting per-token outcomes.

use futures::future::join_all;
use ridecore_types::PushIds;
use serde_json::json;
use tracing::{info, warn};

use ridecore_config::PushConfig;

/// The rendered content of one push notification
#[derive(Debug, Clone)]
pub struct PushNote {
    pub title: String,
    pub message: String,
    pub kind: String,
    pub channel_key: String,
    pub image_url: Option<String>,
}

/// Counts collected from a batch send
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
}

/// Push provider client
pub struct PushSender {
    http: reqwest::Client,
    cfg: Option<PushConfig>,
}

impl PushSender {
    /// Create a new push sender; without provider configuration every
    /// send is logged and dropped.
    pub fn new(cfg: Option<PushConfig>) -> Self {
        if cfg.is_none() {
            warn!("Push provider not configured, notifications will be dropped");
        }
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    /// Send one notification to a single device token
    pub async fn send_to_token(
        &self,
        token: &str,
        note: &PushNote,
        ids: &PushIds,
    ) -> anyhow::Result<()> {
        let Some(cfg) = &self.cfg else {
            warn!(title = note.title.as_str(), "Push provider not configured, dropping");
            return Ok(());
        };

        let body = json!({
            "token": token,
            "title": note.title,
            "message": note.message,
            "type": note.kind,
            "channelKey": note.channel_key,
            "imageUrl": note.image_url,
            "ids": ids,
        });

        let response = self
            .http
            .post(&cfg.api_url)
            .header("Authorization", format!("key={}", cfg.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("push provider returned {status}");
        }

        info!(
            kind = note.kind.as_str(),
            channel = note.channel_key.as_str(),
            "Push notification sent"
        );
        Ok(())
    }

    /// Fan out one send per token; a failed token never aborts the rest
    pub async fn send_batch(
        &self,
        tokens: &[String],
        note: &PushNote,
        ids: &PushIds,
    ) -> BatchOutcome {
        let sends = tokens.iter().map(|token| self.send_to_token(token, note, ids));
        let results = join_all(sends).await;

        let mut outcome = BatchOutcome::default();
        for result in results {
            match result {
                Ok(()) => outcome.success_count += 1,
                Err(e) => {
                    outcome.failure_count += 1;
                    warn!(error = %e, "Batch push send failed for one token");
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_sender_drops_without_error() {
        let sender = PushSender::new(None);
        let note = PushNote {
            title: "Payment Received".to_string(),
            message: "You have received a payment".to_string(),
            kind: "payment".to_string(),
            channel_key: "payment_channel".to_string(),
            image_url: None,
        };

        let result = sender
            .send_to_token("device-token", &note, &PushIds::default())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_batch_counts_every_token() {
        let sender = PushSender::new(None);
        let note = PushNote {
            title: "t".to_string(),
            message: "m".to_string(),
            kind: "custom".to_string(),
            channel_key: "others_channel".to_string(),
            image_url: None,
        };

        let tokens = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let outcome = sender.send_batch(&tokens, &note, &PushIds::default()).await;
        assert_eq!(outcome.success_count + outcome.failure_count, 3);
    }
}
