use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{OrderCycleId, OrderId, StandingLineItem, StandingLineItemId, StandingOrder, StandingOrderId};

#[derive(Debug, Clone, Error)]
pub enum StandingOrderError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Standing order {0} does not exist")]
    StandingOrderNotFound(StandingOrderId),
    #[error("Standing line item {0} does not exist")]
    StandingLineItemNotFound(StandingLineItemId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} does not belong to an order cycle")]
    OrderWithoutCycle(OrderId),
    #[error("Order cycle {order_cycle} is not part of the schedule for standing order {standing_order}")]
    OrderCycleNotInSchedule { standing_order: StandingOrderId, order_cycle: OrderCycleId },
}

impl From<sqlx::Error> for StandingOrderError {
    fn from(e: sqlx::Error) -> Self {
        StandingOrderError::DatabaseError(e.to_string())
    }
}

/// Access to subscriptions, their line items, and the orders generated from them.
#[allow(async_fn_in_trait)]
pub trait StandingOrderManagement {
    async fn fetch_standing_order(&self, id: StandingOrderId) -> Result<Option<StandingOrder>, StandingOrderError>;

    /// The standing order that generated the given order, if any.
    async fn fetch_standing_order_for_order(&self, order: OrderId)
        -> Result<Option<StandingOrder>, StandingOrderError>;

    async fn fetch_standing_line_item(
        &self,
        id: StandingLineItemId,
    ) -> Result<Option<StandingLineItem>, StandingOrderError>;

    async fn fetch_standing_line_items(
        &self,
        standing_order: StandingOrderId,
    ) -> Result<Vec<StandingLineItem>, StandingOrderError>;

    /// Links a generated order to its standing order.
    ///
    /// The order's order cycle must belong to the standing order's schedule, otherwise
    /// [`StandingOrderError::OrderCycleNotInSchedule`] is returned.
    async fn link_order(&self, standing_order: StandingOrderId, order: OrderId) -> Result<(), StandingOrderError>;

    /// Stores a new quantity for the standing line item and returns the updated record.
    async fn update_standing_line_item_quantity(
        &self,
        id: StandingLineItemId,
        quantity: i64,
    ) -> Result<StandingLineItem, StandingOrderError>;

    /// Copies the standing line item's quantity onto the line items for the same variant in every incomplete order
    /// generated from its standing order, skipping orders whose order cycle closed before `now`.
    ///
    /// Returns the number of line items that were updated.
    async fn update_pending_line_items(
        &self,
        item: &StandingLineItem,
        now: DateTime<Utc>,
    ) -> Result<u64, StandingOrderError>;
}
