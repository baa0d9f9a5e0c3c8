//! Best-effort completion notification.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::EventBus;
use crate::model::DeliveryCompletedEvent;

/// Hands completion events to the bus without waiting for the outcome.
///
/// Failure is silent to the caller: a publish error is logged and the event is
/// dropped. Nothing retries it, so a lost event means the ledger never credits
/// that delivery.
#[derive(Clone)]
pub struct CompletionNotifier {
    bus: Arc<dyn EventBus>,
}

impl CompletionNotifier {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Spawn the publish and return at once.
    pub fn notify(&self, event: DeliveryCompletedEvent) -> JoinHandle<()> {
        let missing = event.missing_fields();
        if !missing.is_empty() {
            warn!(?missing, "Completion event is missing recommended fields");
        }

        let bus = self.bus.clone();
        let event = Arc::new(event);
        tokio::spawn(async move {
            let delivery = event.delivery_id;
            match bus.publish(event).await {
                Ok(()) => debug!(?delivery, "Completion event published"),
                Err(e) => error!(?delivery, error = %e, "Failed to publish completion event"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockEventBus;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_notify_publishes_in_background() {
        let bus = Arc::new(MockEventBus::new());
        let notifier = CompletionNotifier::new(bus.clone());
        let order = Uuid::new_v4();

        notifier
            .notify(DeliveryCompletedEvent::new(
                Uuid::new_v4(),
                order,
                Some(order),
                Utc::now(),
            ))
            .await
            .unwrap();

        let published = bus.take_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].account_id, Some(order));
    }

    #[tokio::test]
    async fn test_notify_swallows_publish_failure() {
        let bus = Arc::new(MockEventBus::new());
        bus.set_fail_on_publish(true).await;
        let notifier = CompletionNotifier::new(bus.clone());

        let handle = notifier.notify(DeliveryCompletedEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            Utc::now(),
        ));

        assert!(handle.await.is_ok());
        assert_eq!(bus.attempt_count().await, 1);
        assert_eq!(bus.published_count().await, 0);
    }
}
