//! Delivery service: persistence plus completion notification.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DeliveryError, Result};
use crate::bus::CompletionNotifier;
use crate::model::{Delivery, DeliveryCompletedEvent, DeliveryPatch, NewDelivery};
use crate::storage::DeliveryStore;

/// Creates, updates and reads deliveries.
///
/// The first arrival in `DELIVERED` hands a completion event to the notifier.
/// Notification is fire-and-forget: the update has already been persisted and
/// its result never depends on the publish.
pub struct DeliveryService {
    store: Arc<dyn DeliveryStore>,
    notifier: CompletionNotifier,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn DeliveryStore>, notifier: CompletionNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, new: NewDelivery) -> Result<Delivery> {
        let delivery = Delivery::create(new, Utc::now());
        self.store.insert(&delivery).await?;
        info!(delivery = %delivery.id, order = %delivery.order_id, "delivery created");
        Ok(delivery)
    }

    /// Apply a courier change and/or a status transition.
    pub async fn update(&self, id: Uuid, patch: DeliveryPatch) -> Result<Delivery> {
        let mut delivery = self.get(id).await?;

        // Status first: a rejected transition must leave the courier untouched.
        let outcome = match patch.status {
            Some(status) => Some(delivery.transition(status, Utc::now())?),
            None => None,
        };
        if let Some(courier_id) = patch.courier_id {
            delivery.courier_id = Some(courier_id);
        }

        self.store.update(&delivery).await?;

        match outcome {
            Some(outcome) => {
                info!(
                    delivery = %delivery.id,
                    from = %outcome.from,
                    to = %outcome.to,
                    "delivery status changed"
                );
                if outcome.first_delivery {
                    self.notify_completed(&delivery);
                }
            }
            None => debug!(delivery = %delivery.id, "delivery updated"),
        }

        Ok(delivery)
    }

    pub async fn get(&self, id: Uuid) -> Result<Delivery> {
        self.store
            .get(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Delivery>> {
        Ok(self.store.list().await?)
    }

    fn notify_completed(&self, delivery: &Delivery) {
        let completed_at = delivery.delivered_date.unwrap_or_else(Utc::now);
        let event = DeliveryCompletedEvent::new(
            delivery.id,
            delivery.order_id,
            Some(delivery.order_id),
            completed_at,
        );
        self.notifier.notify(event);
    }
}
