//! Completion-event bus.
//!
//! This module contains:
//! - `EventBus` trait: publishing completion events
//! - `EventHandler` trait: applying a received event
//! - `consumer`: ack policy, reconnect policy and connection state shared by
//!   every consumer
//! - Implementations: AMQP (RabbitMQ), in-process channel, Mock

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::model::DeliveryCompletedEvent;

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod channel;
pub mod consumer;
pub mod mock;
mod notify;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::{AmqpConsumer, AmqpPublisher};
pub use channel::{ChannelBus, ChannelConsumer};
pub use consumer::{
    AckMode, ConnectionState, ConnectionStateHandle, Disposition, LedgerAccrualHandler,
    ReconnectPolicy,
};
pub use mock::MockEventBus;
pub use notify::CompletionNotifier;

/// Header carrying how many times a message has been handed to the consumer.
pub const DELIVERY_ATTEMPTS_HEADER: &str = "x-delivery-attempts";

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Undecodable message: {0}")]
    Decode(String),

    #[error("Handler failed: {message}")]
    Handler { message: String, retryable: bool },

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl BusError {
    /// Whether processing the same message again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BusError::Handler { retryable, .. } => *retryable,
            BusError::Decode(_) => false,
            _ => true,
        }
    }
}

/// Handler for processing events from the bus.
pub trait EventHandler: Send + Sync {
    /// Apply one event. The future resolves once the effect is durable.
    fn handle(&self, event: Arc<DeliveryCompletedEvent>)
        -> BoxFuture<'static, std::result::Result<(), BusError>>;
}

/// Interface for sending completion events to the durable queue.
///
/// Implementations:
/// - `AmqpPublisher`: RabbitMQ via AMQP
/// - `ChannelBus`: in-process queue
/// - `MockEventBus`: In-memory mock for testing
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event. Returns once the broker has accepted it.
    async fn publish(&self, event: Arc<DeliveryCompletedEvent>) -> Result<()>;
}
