//! RabbitMQ implementation of the broker client
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
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use ridecore_config::BrokerConfig;
use ridecore_types::{Exchange, RoutingKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{BrokerError, Result};
use crate::traits::{BrokerClient, MessageHandler};

/// RabbitMQ broker client.
///
/// Owns one connection/channel pair for the whole process. On an
/// unexpected connection close the handles are marked dead and stay
/// dead: in-flight consumer state cannot be resumed safely, so restart
/// is the recovery path.
pub struct RabbitBroker {
    connection: Connection,
    channel: Channel,
    connected: Arc<AtomicBool>,
    prefetch: u16,
}

impl RabbitBroker {
    /// Connect with a bounded exponential-backoff retry budget.
    ///
    /// Exhausting the budget returns `ConnectionExhausted`; the caller
    /// (the binary's composition root) decides whether that is fatal.
    pub async fn connect(cfg: &BrokerConfig) -> Result<Self> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match Self::try_connect(cfg).await {
                Ok(broker) => {
                    info!(url = cfg.url.as_str(), attempt, "Broker connected");
                    return Ok(broker);
                }
                Err(e) if attempt < cfg.connect_attempts => {
                    let factor = 1u64 << (attempt - 1).min(16);
                    let delay = Duration::from_millis(
                        cfg.connect_initial_delay_ms.saturating_mul(factor),
                    );
                    warn!(
                        attempt,
                        max_attempts = cfg.connect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Broker connection failed, retrying with exponential backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        attempts = attempt,
                        error = %e,
                        "Broker connection retries exhausted"
                    );
                    return Err(BrokerError::ConnectionExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn try_connect(cfg: &BrokerConfig) -> Result<Self> {
        let connection = Connection::connect(&cfg.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        // Declare the topic exchanges every producer and consumer assumes
        for exchange in [Exchange::Notification, Exchange::Driver] {
            channel
                .exchange_declare(
                    exchange.as_str(),
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        connection.on_error(move |err| {
            error!(error = %err, "Broker connection closed unexpectedly");
            flag.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            connection,
            channel,
            connected,
            prefetch: cfg.prefetch,
        })
    }

    /// Close the channel and connection gracefully
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(error = %e, "Error closing broker channel");
        }
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(error = %e, "Error closing broker connection");
        }
        info!("Broker connection closed");
    }
}

#[async_trait]
impl BrokerClient for RabbitBroker {
    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: &RoutingKey,
        payload: &serde_json::Value,
    ) -> Result<()> {
        if !self.is_connected() {
            error!(
                exchange = exchange.as_str(),
                routing_key = %routing_key,
                "Publish refused: broker not connected"
            );
            return Err(BrokerError::NotConnected);
        }

        let body = serde_json::to_vec(payload)?;

        self.channel
            .basic_publish(
                exchange.as_str(),
                &routing_key.to_string(),
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;

        info!(
            exchange = exchange.as_str(),
            routing_key = %routing_key,
            "Message published"
        );

        Ok(())
    }

    async fn consume(
        &self,
        exchange: Exchange,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<()> {
        if !self.is_connected() {
            error!(pattern, "Consume refused: broker not connected");
            return Err(BrokerError::NotConnected);
        }

        self.channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await?;

        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.channel
            .queue_bind(
                queue.name().as_str(),
                exchange.as_str(),
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let mut consumer = self
            .channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let pattern_owned = pattern.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        error!(pattern = pattern_owned.as_str(), error = %e, "Consumer delivery error");
                        continue;
                    }
                };

                let routing_key = RoutingKey::parse(delivery.routing_key.as_str());

                let content: serde_json::Value = match serde_json::from_slice(&delivery.data) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(
                            routing_key = %routing_key,
                            error = %e,
                            "Dropping undecodable message"
                        );
                        if let Err(e) = delivery
                            .nack(BasicNackOptions {
                                requeue: false,
                                ..Default::default()
                            })
                            .await
                        {
                            error!(error = %e, "Failed to nack message");
                        }
                        continue;
                    }
                };

                match handler(content, routing_key.clone()).await {
                    Ok(()) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!(routing_key = %routing_key, error = %e, "Failed to ack message");
                        }
                    }
                    Err(e) => {
                        error!(
                            routing_key = %routing_key,
                            error = %e,
                            "Consumer handler failed, discarding message"
                        );
                        if let Err(e) = delivery
                            .nack(BasicNackOptions {
                                requeue: false,
                                ..Default::default()
                            })
                            .await
                        {
                            error!(error = %e, "Failed to nack message");
                        }
                    }
                }
            }

            warn!(pattern = pattern_owned.as_str(), "Consumer stream ended");
        });

        info!(exchange = exchange.as_str(), pattern, "Listening");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.connection.status().connected()
    }

    fn client_type(&self) -> &str {
        "rabbitmq"
    }
}
