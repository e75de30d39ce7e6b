//! In-memory broker client for tests
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


use async_trait::async_trait;
use ridecore_types::{Exchange, RoutingKey};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::topic::topic_matches;
use crate::traits::{BrokerClient, MessageHandler};

/// A message recorded by the in-memory broker
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: Exchange,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

struct Binding {
    exchange: Exchange,
    pattern: String,
    handler: MessageHandler,
}

/// In-process fake broker honoring topic wildcard routing.
///
/// Publishes are delivered inline to every matching handler, so tests
/// observe effects deterministically without a running broker.
#[derive(Default)]
pub struct MemoryBroker {
    bindings: Mutex<Vec<Binding>>,
    published: Mutex<Vec<PublishedMessage>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in order
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    /// Messages published with the given routing key
    pub async fn published_to(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: &RoutingKey,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let key = routing_key.to_string();

        self.published.lock().await.push(PublishedMessage {
            exchange,
            routing_key: key.clone(),
            payload: payload.clone(),
        });

        let handlers: Vec<MessageHandler> = self
            .bindings
            .lock()
            .await
            .iter()
            .filter(|b| b.exchange == exchange && topic_matches(&b.pattern, &key))
            .map(|b| b.handler.clone())
            .collect();

        for handler in handlers {
            if let Err(e) = handler(payload.clone(), RoutingKey::parse(&key)).await {
                // Mirrors nack-without-requeue: the failure is observed, the
                // message is not retried.
                warn!(routing_key = key.as_str(), error = %e, "In-memory handler failed");
            }
        }

        Ok(())
    }

    async fn consume(
        &self,
        exchange: Exchange,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<()> {
        self.bindings.lock().await.push(Binding {
            exchange,
            pattern: pattern.to_string(),
            handler,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn client_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_reaches_matching_binding() {
        let broker = MemoryBroker::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        broker
            .consume(
                Exchange::Notification,
                "notification.fcm.*",
                Arc::new(move |_payload, _key| {
                    let counter = Arc::clone(&counter);
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        broker
            .publish(
                Exchange::Notification,
                &RoutingKey::NotificationFcm(ridecore_types::Audience::Driver),
                &json!({"fcmToken": "t"}),
            )
            .await
            .unwrap();

        // A key on the other exchange must not be routed to this binding
        broker
            .publish(
                Exchange::Driver,
                &RoutingKey::DriverWallet(ridecore_types::WalletTarget::Bulk),
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(broker.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_fail_publish() {
        let broker = MemoryBroker::new();

        broker
            .consume(
                Exchange::Notification,
                "notification.#",
                Arc::new(|_payload, _key| {
                    Box::pin(async { Err(anyhow::anyhow!("handler exploded")) })
                }),
            )
            .await
            .unwrap();

        let result = broker
            .publish(
                Exchange::Notification,
                &RoutingKey::NotificationWhatsapp,
                &json!({"phone": "91"}),
            )
            .await;

        assert!(result.is_ok());
    }
}
