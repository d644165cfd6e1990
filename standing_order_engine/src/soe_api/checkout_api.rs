//! The checkout workflow that takes a draft order to `complete`.
//!
//! The address, delivery and payment steps are checked in that order, in memory, against the order as it is stored.
//! Every step runs whatever checkout state the order was left in, and nothing is written until all of them pass. The result of the walk is a
//! [`CheckoutCompletion`], which the backend persists in one transaction. A step that fails therefore leaves the
//! stored order exactly as it was.
//!
//! Payments are attached in the `checkout` state and are never processed or captured here.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{AddressId, LineItem, Money, Order, OrderState, ShippingMethodId},
    events::{EventProducers, OrderConfirmationEvent},
    soe_api::errors::CompletionError,
    traits::{CatalogManagement, CheckoutCompletion, OrderManagement, PaymentAttachment},
};

/// Whether completing checkout sends the generic order-confirmation email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmationPolicy {
    /// A regular storefront checkout. The customer receives the generic confirmation.
    #[default]
    Send,
    /// The caller sends its own notification instead. Standing order placement always uses this.
    Suppress,
}

pub struct CheckoutApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B> CheckoutApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> CheckoutApi<B>
where B: OrderManagement + CatalogManagement
{
    /// Drives the order through every checkout step and marks it complete.
    ///
    /// The order is re-read from the backend first, so quantities capped earlier in the same run are taken into
    /// account. If the order was completed in the meantime, [`CompletionError::AlreadyCompleted`] is returned.
    pub async fn advance_to_complete(&self, order: &Order, policy: ConfirmationPolicy) -> Result<Order, CompletionError> {
        let completion = self.prepare_checkout(order).await?;
        let completed = self.db.complete_checkout(completion).await?;
        info!("🛒️ Order {} [{}] is complete. Total: {}", completed.id, completed.number, completed.total);
        match policy {
            ConfirmationPolicy::Send => {
                debug!("🛒️ Sending order confirmation for {}", completed.id);
                self.producers.publish_order_confirmation(OrderConfirmationEvent::new(&completed)).await;
            },
            ConfirmationPolicy::Suppress => {
                trace!("🛒️ Order confirmation for {} suppressed", completed.id);
            },
        }
        Ok(completed)
    }

    /// Runs the checkout steps without writing anything. On success, the returned value holds everything that
    /// completing the order will persist.
    pub async fn prepare_checkout(&self, order: &Order) -> Result<CheckoutCompletion, CompletionError> {
        let order = self.db.fetch_order(order.id).await?.ok_or(CompletionError::OrderNotFound(order.id))?;
        if order.is_complete() {
            return Err(CompletionError::AlreadyCompleted(order.id));
        }
        let items = self.db.fetch_line_items(order.id).await?;
        if items.is_empty() {
            return Err(CompletionError::EmptyOrder(order.id));
        }
        let item_total = items.iter().map(LineItem::amount).sum::<Money>();
        let total = item_total;
        self.check_addresses(&order).await?;
        let shipping_method_id = self.resolve_shipping_method(&order).await?;
        let payment = self.resolve_payment(&order, total).await?;
        trace!("🛒️ Order {}: every checkout step passed. {} → {}", order.id, order.state, OrderState::Complete);
        Ok(CheckoutCompletion {
            order_id: order.id,
            shipping_method_id,
            item_total,
            total,
            payment,
            completed_at: chrono::Utc::now(),
        })
    }

    async fn check_addresses(&self, order: &Order) -> Result<(), CompletionError> {
        self.check_address(order, order.bill_address_id, "billing").await?;
        self.check_address(order, order.ship_address_id, "shipping").await
    }

    async fn check_address(
        &self,
        order: &Order,
        id: Option<AddressId>,
        kind: &'static str,
    ) -> Result<(), CompletionError> {
        let id = id.ok_or(CompletionError::MissingAddress { order: order.id, kind })?;
        let address = self.db.fetch_address(id).await?.ok_or(CompletionError::MissingAddress { order: order.id, kind })?;
        let missing = address.missing_fields();
        if !missing.is_empty() {
            return Err(CompletionError::InvalidAddress { order: order.id, kind, missing });
        }
        Ok(())
    }

    async fn resolve_shipping_method(&self, order: &Order) -> Result<ShippingMethodId, CompletionError> {
        let offered = self.db.shipping_methods_for_shop(order.shop_id).await?;
        let chosen = match order.shipping_method_id {
            Some(id) => id,
            None => {
                let first = offered.first().ok_or(CompletionError::NoShippingMethod(order.id))?;
                debug!("🛒️ Order {} has no shipping method. Using the shop default, {}", order.id, first.name);
                first.id
            },
        };
        if !offered.iter().any(|m| m.id == chosen) {
            return Err(CompletionError::ShippingMethodUnavailable { order: order.id, method: chosen });
        }
        Ok(chosen)
    }

    async fn resolve_payment(&self, order: &Order, amount: Money) -> Result<PaymentAttachment, CompletionError> {
        let method = order.payment_method_id.ok_or(CompletionError::MissingPaymentMethod(order.id))?;
        let accepted = self.db.payment_methods_for_shop(order.shop_id).await?;
        if !accepted.iter().any(|m| m.id == method) {
            return Err(CompletionError::PaymentMethodUnavailable { order: order.id, method });
        }
        Ok(PaymentAttachment { payment_method_id: method, amount })
    }
}
