//! Consumer policy shared by the AMQP and in-process consumers.
//!
//! A message moves through three steps: decode, correlate, apply. What the
//! consumer then does with the broker copy (acknowledge, retry or dead-letter)
//! is decided by [`decide`], a pure function of the outcome, the attempt
//! number and the configured [`AckMode`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{BusError, EventHandler, Result};
use crate::ledger::{AccrualOutcome, LedgerEngine};
use crate::model::DeliveryCompletedEvent;

/// When a message is acknowledged relative to the ledger write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Acknowledge only once the ledger write committed. Retryable failures
    /// are redelivered up to a bound, everything else is dead-lettered.
    #[default]
    AfterCommit,
    /// Acknowledge every message whatever happened. A failed ledger write
    /// loses the accrual.
    Always,
}

/// Fixed-delay reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause between a lost or failed connection and the next attempt.
    pub delay: Duration,
    /// Consecutive failed reconnects tolerated. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn backoff(&self) -> ConstantBackoff {
        let times = self
            .max_attempts
            .map(|n| n as usize)
            .unwrap_or(usize::MAX);
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(times)
            .build()
    }
}

/// Consumer connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Consuming,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Consuming => "CONSUMING",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable connection state.
#[derive(Clone)]
pub struct ConnectionStateHandle {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Consumer connection state changed");
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

/// Result of handing one message to the handler.
#[derive(Debug)]
pub enum MessageOutcome {
    /// The handler applied the event (or recognized it as already applied).
    Handled,
    /// No account to credit. Dropped on purpose.
    Discarded,
    /// The handler failed.
    Failed(BusError),
    /// The payload could not be decoded.
    Poison(BusError),
}

/// What to do with the broker copy of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Redeliver as attempt `next_attempt`.
    Retry { next_attempt: u32 },
    DeadLetter { reason: String },
}

/// Choose the disposition for a processed message. `attempt` is 1-based.
pub fn decide(
    outcome: &MessageOutcome,
    attempt: u32,
    mode: AckMode,
    max_attempts: u32,
) -> Disposition {
    if mode == AckMode::Always {
        return Disposition::Ack;
    }
    match outcome {
        MessageOutcome::Handled | MessageOutcome::Discarded => Disposition::Ack,
        MessageOutcome::Poison(e) => Disposition::DeadLetter {
            reason: e.to_string(),
        },
        MessageOutcome::Failed(e) if e.is_retryable() && attempt < max_attempts => {
            Disposition::Retry {
                next_attempt: attempt + 1,
            }
        }
        MessageOutcome::Failed(e) if e.is_retryable() => Disposition::DeadLetter {
            reason: format!("{} (gave up after {} attempts)", e, attempt),
        },
        MessageOutcome::Failed(e) => Disposition::DeadLetter {
            reason: e.to_string(),
        },
    }
}

/// Pause before redelivering as `next_attempt`: `base` once per failure so far.
pub fn retry_delay(base: Duration, next_attempt: u32) -> Duration {
    base * next_attempt.saturating_sub(1)
}

/// Decode a payload and hand it to the handler.
pub async fn process_payload(payload: &[u8], handler: &dyn EventHandler) -> MessageOutcome {
    let event = match DeliveryCompletedEvent::from_json(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to decode completion event");
            return MessageOutcome::Poison(BusError::Decode(e.to_string()));
        }
    };

    if event.correlation_id().is_none() {
        warn!(
            delivery = ?event.delivery_id,
            "Completion event has no account or order id, discarding"
        );
        return MessageOutcome::Discarded;
    }

    match handler.handle(Arc::new(event)).await {
        Ok(()) => MessageOutcome::Handled,
        Err(e) => {
            error!(error = %e, "Handler failed");
            MessageOutcome::Failed(e)
        }
    }
}

/// Log what happened to a settled message.
pub(crate) fn log_disposition(outcome: &MessageOutcome, disposition: &Disposition, attempt: u32) {
    match (outcome, disposition) {
        (MessageOutcome::Failed(e), Disposition::Ack) => {
            error!(error = %e, attempt, "Ledger write failed, message acknowledged anyway");
        }
        (_, Disposition::Ack) => debug!(attempt, "Message acknowledged"),
        (_, Disposition::Retry { next_attempt }) => {
            warn!(attempt, next_attempt, "Message scheduled for redelivery");
        }
        (_, Disposition::DeadLetter { reason }) => {
            error!(attempt, reason = %reason, "Message dead-lettered");
        }
    }
}

/// Run consumer sessions until the reconnect policy gives up.
///
/// `session` connects and consumes. It returns `Err` when it could not reach
/// the consuming state and `Ok` when an established stream ended. Only
/// consecutive `Err`s count toward the policy bound.
pub async fn run_with_reconnect<S, Fut>(
    policy: &ReconnectPolicy,
    state: &ConnectionStateHandle,
    mut session: S,
) -> Result<()>
where
    S: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut backoff = policy.backoff();
    let mut failures: u32 = 0;

    loop {
        state.set(ConnectionState::Connecting);
        let delay = match session().await {
            Ok(()) => {
                failures = 0;
                backoff = policy.backoff();
                info!(delay_secs = policy.delay.as_secs_f64(), "Consumer stream ended, reconnecting");
                Some(policy.delay)
            }
            Err(e) => {
                failures += 1;
                let delay = backoff.next();
                error!(
                    error = %e,
                    failures,
                    delay_secs = policy.delay.as_secs_f64(),
                    "Failed to set up consumer"
                );
                delay
            }
        };
        state.set(ConnectionState::Disconnected);

        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                error!(attempts = failures, "Giving up on consumer reconnect");
                return Err(BusError::ReconnectExhausted { attempts: failures });
            }
        }
    }
}

/// Credits the delivery bonus for each completion event.
pub struct LedgerAccrualHandler {
    engine: Arc<LedgerEngine>,
}

impl LedgerAccrualHandler {
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }
}

impl EventHandler for LedgerAccrualHandler {
    fn handle(
        &self,
        event: Arc<DeliveryCompletedEvent>,
    ) -> BoxFuture<'static, std::result::Result<(), BusError>> {
        let engine = self.engine.clone();
        Box::pin(async move {
            let account_id = event.correlation_id().ok_or_else(|| BusError::Handler {
                message: "event has no account or order id".to_string(),
                retryable: false,
            })?;

            match engine.accrue_for_delivery(account_id, &event).await {
                Ok(AccrualOutcome::Applied(tx)) => {
                    debug!(transaction = %tx.id, "Delivery bonus committed");
                    Ok(())
                }
                Ok(AccrualOutcome::Duplicate(_)) => Ok(()),
                Err(e) => Err(BusError::Handler {
                    retryable: !e.is_validation(),
                    message: e.to_string(),
                }),
            }
        })
    }
}
