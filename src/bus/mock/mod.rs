//! Mock event bus implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use super::{BusError, EventBus, Result};
use crate::model::DeliveryCompletedEvent;

/// Mock event bus for testing.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<DeliveryCompletedEvent>>,
    fail_on_publish: RwLock<bool>,
    attempts: RwLock<usize>,
    attempted: Notify,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Publish calls seen so far, successful or not.
    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }

    pub async fn take_published(&self) -> Vec<DeliveryCompletedEvent> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Wait until at least `count` publish calls have been made.
    pub async fn wait_for_attempts(&self, count: usize) {
        loop {
            let notified = self.attempted.notified();
            if self.attempt_count().await >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, event: Arc<DeliveryCompletedEvent>) -> Result<()> {
        let result = if *self.fail_on_publish.read().await {
            Err(BusError::Connection("Mock publish failure".to_string()))
        } else {
            self.published.write().await.push((*event).clone());
            Ok(())
        };
        *self.attempts.write().await += 1;
        self.attempted.notify_waiters();
        result
    }
}
