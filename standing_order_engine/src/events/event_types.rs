use serde::Serialize;

use crate::db_types::{ChangesMap, Money, Notification, Order, OrderId, QuantityChange};

/// Asks the mailer to send the "your standing order was placed" email. `changes` lists the line items that were
/// capped to the available stock, with their original quantities; it is empty for an order placed as subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementEmailEvent {
    pub order: Order,
    pub changes: ChangesMap,
    pub notification: Notification,
}

impl PlacementEmailEvent {
    pub fn new(order: Order, changes: ChangesMap, notification: Notification) -> Self {
        Self { order, changes, notification }
    }

    pub fn was_capped(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn quantity_changes(&self) -> Vec<QuantityChange> {
        self.changes.to_changes()
    }
}

/// Asks the mailer to tell the customer their standing order could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementFailedEvent {
    pub order: Order,
    pub reason: String,
    pub notification: Notification,
}

impl PlacementFailedEvent {
    pub fn new<S: Into<String>>(order: Order, reason: S, notification: Notification) -> Self {
        Self { order, reason: reason.into(), notification }
    }
}

/// The generic order-confirmation email that a normal storefront checkout triggers. The placement job completes
/// checkout with confirmations suppressed, so it never publishes this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderConfirmationEvent {
    pub order_number: String,
    pub order_id: OrderId,
    pub total: Money,
}

impl OrderConfirmationEvent {
    pub fn new(order: &Order) -> Self {
        Self { order_number: order.number.clone(), order_id: order.id, total: order.total }
    }
}
