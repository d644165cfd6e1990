use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ChangesMap, NewNotification, Notification, Order},
    events::{EventProducers, PlacementEmailEvent, PlacementFailedEvent},
    soe_api::errors::NotificationError,
    traits::NotificationOutbox,
};

/// Dispatches the placement emails for standing orders.
///
/// Every dispatch writes one record to the notification outbox and then hands the record to the registered mail
/// hooks. The generic order confirmation is never sent from here.
pub struct NotificationApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for NotificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi")
    }
}

impl<B> NotificationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> NotificationApi<B>
where B: NotificationOutbox
{
    /// Records a `placement` notification, or a `capped` one if `changes` is not empty, and publishes it.
    pub async fn send_placement_email(
        &self,
        order: &Order,
        changes: &ChangesMap,
    ) -> Result<Notification, NotificationError> {
        let notification = self
            .db
            .record_notification(NewNotification::placement(order.id, changes))
            .await
            .map_err(|source| NotificationError::Outbox { order: order.id, source })?;
        debug!("📧️ {} notification {} queued for order {}", notification.kind, notification.id, order.id);
        let event = PlacementEmailEvent::new(order.clone(), changes.clone(), notification.clone());
        self.producers.publish_placement_email(event).await;
        Ok(notification)
    }

    /// Records a `failure` notification for an order the placement job had to skip, and publishes it.
    pub async fn send_failure_email(&self, order: &Order, reason: &str) -> Result<Notification, NotificationError> {
        let notification = self
            .db
            .record_notification(NewNotification::failure(order.id, reason))
            .await
            .map_err(|source| NotificationError::Outbox { order: order.id, source })?;
        debug!("📧️ Failure notification {} queued for order {}", notification.id, order.id);
        let event = PlacementFailedEvent::new(order.clone(), reason, notification.clone());
        self.producers.publish_placement_failed(event).await;
        Ok(notification)
    }
}
