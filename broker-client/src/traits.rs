//! Traits for broker operations

use async_trait::async_trait;
use futures::future::BoxFuture;
use ridecore_types::{Exchange, RoutingKey};
use std::sync::Arc;
use tracing::error;

/// Handler invoked once per delivered message.
///
/// Returning `Err` nacks the delivery without requeue; the message is
/// discarded rather than retried against a possibly non-idempotent job.
pub type MessageHandler =
    Arc<dyn Fn(serde_json::Value, RoutingKey) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Trait for broker clients
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publish a payload as a persistent message on an exchange
    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: &RoutingKey,
        payload: &serde_json::Value,
    ) -> Result<(), crate::error::BrokerError>;

    /// Bind an exclusive queue to an exchange with a topic pattern and
    /// invoke `handler` per delivered message. Acks on handler success,
    /// nacks without requeue on handler failure.
    async fn consume(
        &self,
        exchange: Exchange,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<(), crate::error::BrokerError>;

    /// Cheap non-blocking liveness probe
    fn is_connected(&self) -> bool;

    /// Get the client type name
    fn client_type(&self) -> &str;

    /// Publish where delivery is best-effort: a failure is logged with the
    /// routing key and never propagated into the caller's primary
    /// operation.
    async fn publish_best_effort(
        &self,
        exchange: Exchange,
        routing_key: &RoutingKey,
        payload: &serde_json::Value,
    ) -> bool {
        match self.publish(exchange, routing_key, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    exchange = exchange.as_str(),
                    routing_key = %routing_key,
                    error = %e,
                    "Best-effort publish failed"
                );
                false
            }
        }
    }
}
