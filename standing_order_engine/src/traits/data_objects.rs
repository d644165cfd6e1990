use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Money, OrderId, PaymentMethodId, ShippingMethodId};

/// The payment to attach to an order when it completes checkout. The payment is recorded in the `checkout` state and
/// is never processed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttachment {
    pub payment_method_id: PaymentMethodId,
    pub amount: Money,
}

/// Everything the checkout workflow resolved for an order. Backends persist this in a single atomic transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCompletion {
    pub order_id: OrderId,
    pub shipping_method_id: ShippingMethodId,
    pub item_total: Money,
    pub total: Money,
    pub payment: PaymentAttachment,
    pub completed_at: DateTime<Utc>,
}
