use thiserror::Error;

use crate::{
    db_types::{LineItemId, OrderCycleId, OrderId, PaymentMethodId, ShippingMethodId, StandingLineItemId, VariantId},
    traits::{CatalogError, InventoryError, OrderManagementError, OutboxError, StandingOrderError},
};

/// The placement job could not work out which orders to process. This is fatal to the run.
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    #[error("Could not fetch the orders for order cycle {order_cycle}: {reason}")]
    QueryFailed { order_cycle: OrderCycleId, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum CapError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has already been completed")]
    AlreadyCompleted(OrderId),
    #[error("Could not read the line items of order {order}: {reason}")]
    LineItemsUnavailable { order: OrderId, reason: String },
    #[error("Could not look up stock for variant {variant}: {source}")]
    StockLookup { variant: VariantId, source: InventoryError },
    #[error("Could not store the capped quantity for line item {line_item}: {source}")]
    Persistence { line_item: LineItemId, source: OrderManagementError },
    #[error("Could not update the totals of order {order}: {source}")]
    Totals { order: OrderId, source: OrderManagementError },
}

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has no line items")]
    EmptyOrder(OrderId),
    #[error("Order {order} has no {kind} address")]
    MissingAddress { order: OrderId, kind: &'static str },
    #[error("The {kind} address for order {order} is missing {}", .missing.join(", "))]
    InvalidAddress { order: OrderId, kind: &'static str, missing: Vec<&'static str> },
    #[error("The shop for order {0} does not offer any shipping methods")]
    NoShippingMethod(OrderId),
    #[error("Shipping method {method} is not offered by the shop for order {order}")]
    ShippingMethodUnavailable { order: OrderId, method: ShippingMethodId },
    #[error("Order {0} has no payment method")]
    MissingPaymentMethod(OrderId),
    #[error("Payment method {method} is not accepted by the shop for order {order}")]
    PaymentMethodUnavailable { order: OrderId, method: PaymentMethodId },
    #[error("Order {0} has already been completed")]
    AlreadyCompleted(OrderId),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<OrderManagementError> for CompletionError {
    fn from(e: OrderManagementError) -> Self {
        match e {
            OrderManagementError::AlreadyCompleted(id) => CompletionError::AlreadyCompleted(id),
            OrderManagementError::OrderNotFound(id) => CompletionError::OrderNotFound(id),
            e => CompletionError::DatabaseError(e.to_string()),
        }
    }
}

impl From<CatalogError> for CompletionError {
    fn from(e: CatalogError) -> Self {
        CompletionError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Could not record the notification for order {order}: {source}")]
    Outbox { order: OrderId, source: OutboxError },
}

/// Why a single order was skipped by the placement job.
#[derive(Debug, Clone, Error)]
pub enum PlacementError {
    #[error("{0}")]
    Capping(#[from] CapError),
    #[error("{0}")]
    Completion(#[from] CompletionError),
}

impl PlacementError {
    /// True if the order was completed by someone else before this run got to it.
    pub fn is_already_completed(&self) -> bool {
        matches!(
            self,
            PlacementError::Capping(CapError::AlreadyCompleted(_))
                | PlacementError::Completion(CompletionError::AlreadyCompleted(_))
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum StandingLineItemError {
    #[error("Quantity must be a positive integer. Got {0}")]
    InvalidQuantity(i64),
    #[error("Standing line item {0} does not exist")]
    NotFound(StandingLineItemId),
    #[error("Variant {0} does not exist")]
    VariantNotFound(VariantId),
    #[error("Variant {0} is not available to this shop in any order cycle of the schedule")]
    VariantUnavailable(VariantId),
    #[error("{0}")]
    StandingOrder(#[from] StandingOrderError),
    #[error("{0}")]
    Catalog(#[from] CatalogError),
}
