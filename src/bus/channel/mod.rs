//! In-process durable queue for single-binary runs and tests.
//!
//! Behaves like one broker queue: messages wait until a consumer settles
//! them, a retry goes to the back of the queue with its attempt counter, and
//! dead letters are kept for inspection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use super::consumer::{
    decide, log_disposition, process_payload, retry_delay, AckMode, ConnectionState,
    ConnectionStateHandle, Disposition,
};
use super::{BusError, EventBus, EventHandler, Result};
use crate::config::ConsumerConfig;
use crate::model::DeliveryCompletedEvent;

/// A queued message and the attempt it will be delivered as.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub payload: Vec<u8>,
    pub attempt: u32,
}

/// A message the consumer gave up on.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub payload: Vec<u8>,
    pub reason: String,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueuedMessage>,
    dead_letters: Vec<DeadLetter>,
    acked: usize,
}

/// In-memory queue implementing [`EventBus`].
#[derive(Clone, Default)]
pub struct ChannelBus {
    state: Arc<Mutex<QueueState>>,
    available: Arc<Notify>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue raw bytes as a first delivery attempt.
    pub async fn publish_raw(&self, payload: Vec<u8>) {
        self.enqueue(QueuedMessage {
            payload,
            attempt: 1,
        })
        .await;
    }

    /// Messages waiting for a consumer.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages acknowledged so far.
    pub async fn acked(&self) -> usize {
        self.state.lock().await.acked
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    async fn enqueue(&self, message: QueuedMessage) {
        self.state.lock().await.ready.push_back(message);
        self.available.notify_one();
    }

    async fn try_receive(&self) -> Option<QueuedMessage> {
        self.state.lock().await.ready.pop_front()
    }

    async fn receive(&self) -> QueuedMessage {
        loop {
            if let Some(message) = self.try_receive().await {
                return message;
            }
            self.available.notified().await;
        }
    }

    async fn settle(&self, message: QueuedMessage, disposition: &Disposition) {
        match disposition {
            Disposition::Ack => self.state.lock().await.acked += 1,
            Disposition::Retry { next_attempt } => {
                self.enqueue(QueuedMessage {
                    payload: message.payload,
                    attempt: *next_attempt,
                })
                .await;
            }
            Disposition::DeadLetter { reason } => {
                self.state.lock().await.dead_letters.push(DeadLetter {
                    payload: message.payload,
                    reason: reason.clone(),
                });
            }
        }
    }
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn publish(&self, event: Arc<DeliveryCompletedEvent>) -> Result<()> {
        let payload = event
            .to_json()
            .map_err(|e| BusError::Publish(format!("Failed to encode event: {}", e)))?;
        self.publish_raw(payload).await;
        debug!(delivery = ?event.delivery_id, "Published completion event to channel");
        Ok(())
    }
}

/// Consumer draining a [`ChannelBus`].
pub struct ChannelConsumer {
    bus: ChannelBus,
    handler: Arc<dyn EventHandler>,
    ack_mode: AckMode,
    max_delivery_attempts: u32,
    retry_delay: Duration,
}

impl ChannelConsumer {
    pub fn new(bus: ChannelBus, handler: Arc<dyn EventHandler>, config: &ConsumerConfig) -> Self {
        Self {
            bus,
            handler,
            ack_mode: config.ack_mode,
            max_delivery_attempts: config.max_delivery_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Process the next waiting message, if any.
    pub async fn process_next(&self) -> Option<Disposition> {
        let message = self.bus.try_receive().await?;
        Some(self.process(message).await)
    }

    /// Process messages until the queue is empty, retries included.
    pub async fn drain(&self) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        while let Some(disposition) = self.process_next().await {
            dispositions.push(disposition);
        }
        dispositions
    }

    /// Consume forever. The in-process queue cannot disconnect, so the state
    /// stays `Consuming` once entered.
    pub async fn run(self, state: ConnectionStateHandle) {
        state.set(ConnectionState::Consuming);
        info!(ack_mode = ?self.ack_mode, "Channel consumer started");
        loop {
            let message = self.bus.receive().await;
            self.process(message).await;
        }
    }

    async fn process(&self, message: QueuedMessage) -> Disposition {
        let outcome = process_payload(&message.payload, self.handler.as_ref()).await;
        let disposition = decide(
            &outcome,
            message.attempt,
            self.ack_mode,
            self.max_delivery_attempts,
        );
        log_disposition(&outcome, &disposition, message.attempt);
        if let Disposition::Retry { next_attempt } = &disposition {
            let delay = retry_delay(self.retry_delay, *next_attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.bus.settle(message, &disposition).await;
        disposition
    }
}

#[cfg(test)]
mod tests;
