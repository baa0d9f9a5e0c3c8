//! AMQP (RabbitMQ) publisher and consumer.
//!
//! Both sides declare the durable `delivery_completed` queue and use the
//! default exchange with the queue name as routing key. Messages are JSON and
//! published persistent (delivery mode 2).
//!
//! Redeliveries are republished by the consumer with an incremented
//! `x-delivery-attempts` header, since a plain requeue carries no counter.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel,
};
use tracing::{debug, error, info};

use super::consumer::{
    decide, log_disposition, process_payload, run_with_reconnect, ConnectionState,
    ConnectionStateHandle, Disposition,
};
use super::{BusError, EventBus, EventHandler, Result, DELIVERY_ATTEMPTS_HEADER};
use crate::config::{AmqpConfig, ConsumerConfig};
use crate::model::DeliveryCompletedEvent;

/// Header recording why a message was dead-lettered.
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

const CONSUMER_TAG: &str = "waybill-bonus";
const POOL_SIZE: usize = 10;

fn build_pool(url: &str) -> Result<Pool> {
    let manager = Manager::new(url.to_string(), Default::default());
    Pool::builder(manager)
        .max_size(POOL_SIZE)
        .build()
        .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))
}

async fn open_channel(pool: &Pool) -> Result<Channel> {
    let conn = pool.get().await.map_err(|e: PoolError| {
        BusError::Connection(format!("Failed to get connection from pool: {}", e))
    })?;

    conn.create_channel()
        .await
        .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
}

async fn declare_durable(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BusError::Subscribe(format!("Failed to declare queue {}: {}", queue, e)))?;
    Ok(())
}

fn json_properties(headers: Option<FieldTable>) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2); // persistent
    match headers {
        Some(headers) => properties.with_headers(headers),
        None => properties,
    }
}

async fn send(
    channel: &Channel,
    queue: &str,
    payload: &[u8],
    headers: Option<FieldTable>,
) -> Result<()> {
    let confirm = channel
        .basic_publish(
            "",
            queue,
            BasicPublishOptions::default(),
            payload,
            json_properties(headers),
        )
        .await
        .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;
    confirm
        .await
        .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;
    Ok(())
}

/// Delivery attempt recorded on a message, 1 when absent.
fn delivery_attempt(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(DELIVERY_ATTEMPTS_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
            _ => None,
        })
        .unwrap_or(1)
        .max(1)
}

fn attempt_headers(attempt: u32) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(DELIVERY_ATTEMPTS_HEADER.into(), AMQPValue::LongUInt(attempt));
    headers
}

fn dead_letter_headers(attempt: u32, reason: &str) -> FieldTable {
    let mut headers = attempt_headers(attempt);
    headers.insert(
        DEAD_LETTER_REASON_HEADER.into(),
        AMQPValue::LongString(reason.to_string().into()),
    );
    headers
}

/// Publishes completion events to RabbitMQ.
///
/// Connections come from a pool and are opened lazily, so a publisher can be
/// built while the broker is still down.
pub struct AmqpPublisher {
    pool: Pool,
    queue: String,
}

impl AmqpPublisher {
    pub fn new(config: &AmqpConfig) -> Result<Self> {
        info!(queue = %config.queue, "AMQP publisher configured");
        Ok(Self {
            pool: build_pool(&config.url)?,
            queue: config.queue.clone(),
        })
    }
}

#[async_trait]
impl EventBus for AmqpPublisher {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(queue = %self.queue))]
    async fn publish(&self, event: Arc<DeliveryCompletedEvent>) -> Result<()> {
        let payload = event
            .to_json()
            .map_err(|e| BusError::Publish(format!("Failed to encode event: {}", e)))?;

        let channel = open_channel(&self.pool).await?;
        declare_durable(&channel, &self.queue).await?;
        send(&channel, &self.queue, &payload, None).await?;

        debug!(delivery = ?event.delivery_id, "Published completion event");
        Ok(())
    }
}

/// Long-lived consumer of the completion queue.
pub struct AmqpConsumer {
    pool: Pool,
    amqp: AmqpConfig,
    consumer: ConsumerConfig,
    handler: Arc<dyn EventHandler>,
    state: ConnectionStateHandle,
}

impl AmqpConsumer {
    pub fn new(
        amqp: AmqpConfig,
        consumer: ConsumerConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        Ok(Self {
            pool: build_pool(&amqp.url)?,
            amqp,
            consumer,
            handler,
            state: ConnectionStateHandle::new(),
        })
    }

    /// Handle for observing the connection state.
    pub fn state(&self) -> ConnectionStateHandle {
        self.state.clone()
    }

    /// Consume until the reconnect policy gives up. With the default
    /// unbounded policy this never returns.
    pub async fn run(self) -> Result<()> {
        let policy = self.consumer.reconnect_policy();
        info!(
            queue = %self.amqp.queue,
            ack_mode = ?self.consumer.ack_mode,
            reconnect_delay_secs = policy.delay.as_secs(),
            "Starting AMQP consumer"
        );
        let this = &self;
        run_with_reconnect(&policy, &self.state, || this.session()).await
    }

    /// One connection's worth of consuming. `Err` if consuming never started.
    async fn session(&self) -> Result<()> {
        let (channel, mut consumer) = self.setup_consumer().await?;
        self.state.set(ConnectionState::Consuming);
        info!(queue = %self.amqp.queue, "Consumer connected, processing messages");

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => self.process_delivery(&channel, delivery).await,
                Err(e) => {
                    error!(error = %e, "Consumer delivery error, will reconnect");
                    break;
                }
            }
        }

        info!(queue = %self.amqp.queue, "Consumer stream ended");
        Ok(())
    }

    async fn setup_consumer(&self) -> Result<(Channel, lapin::Consumer)> {
        let channel = open_channel(&self.pool).await?;
        declare_durable(&channel, &self.amqp.queue).await?;
        declare_durable(&channel, &self.amqp.dead_letter_queue).await?;

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to set prefetch: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &self.amqp.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        Ok((channel, consumer))
    }

    async fn process_delivery(&self, channel: &Channel, delivery: Delivery) {
        let attempt = delivery_attempt(&delivery.properties);
        let outcome = process_payload(&delivery.data, self.handler.as_ref()).await;
        let disposition = decide(
            &outcome,
            attempt,
            self.consumer.ack_mode,
            self.consumer.max_delivery_attempts,
        );
        log_disposition(&outcome, &disposition, attempt);

        // The original is only acknowledged once its replacement is queued.
        let forwarded = match &disposition {
            Disposition::Ack => Ok(()),
            Disposition::Retry { next_attempt } => {
                // qos 1: the pause also holds back the rest of the queue
                tokio::time::sleep(self.consumer.retry_delay(*next_attempt)).await;
                send(
                    channel,
                    &self.amqp.queue,
                    &delivery.data,
                    Some(attempt_headers(*next_attempt)),
                )
                .await
            }
            Disposition::DeadLetter { reason } => {
                send(
                    channel,
                    &self.amqp.dead_letter_queue,
                    &delivery.data,
                    Some(dead_letter_headers(attempt, reason)),
                )
                .await
            }
        };

        match forwarded {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(error = %e, "Failed to ack message");
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to forward message, requeueing");
                let requeue = BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                };
                if let Err(e) = delivery.nack(requeue).await {
                    error!(error = %e, "Failed to nack message");
                }
            }
        }
    }
}
