use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Address, AddressId, LineItem, LineItemId, Order, OrderCycle, OrderCycleId, OrderId, Payment},
    order_objects::OrderQueryFilter,
    traits::CheckoutCompletion,
};

#[derive(Debug, Clone, Error)]
pub enum OrderManagementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested line item {0} does not exist")]
    LineItemNotFound(LineItemId),
    #[error("Order {0} has already been completed")]
    AlreadyCompleted(OrderId),
    #[error("Line item quantities cannot be negative. Got {0}")]
    InvalidQuantity(i64),
}

impl From<sqlx::Error> for OrderManagementError {
    fn from(e: sqlx::Error) -> Self {
        OrderManagementError::DatabaseError(e.to_string())
    }
}

/// Read and write access to orders and their line items.
///
/// Orders are created elsewhere. Implementations only ever change line item quantities, order totals and the
/// checkout completion state of existing orders.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the backing store
    fn url(&self) -> &str;

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, OrderManagementError>;

    /// Fetches the orders matching every criterion in the filter.
    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderManagementError>;

    /// Fetches the orders that the placement job should process for the given order cycle:
    /// incomplete orders in that cycle that were generated from a standing order.
    async fn fetch_placeable_orders(&self, order_cycle: OrderCycleId) -> Result<Vec<Order>, OrderManagementError> {
        let query = OrderQueryFilter::default()
            .with_order_cycle(order_cycle)
            .incomplete()
            .linked_to_standing_order(true);
        self.fetch_orders(query).await
    }

    async fn fetch_line_items(&self, order: OrderId) -> Result<Vec<LineItem>, OrderManagementError>;

    async fn fetch_line_item(&self, id: LineItemId) -> Result<Option<LineItem>, OrderManagementError>;

    /// Sets the quantity of a line item. The change is persisted immediately.
    async fn update_line_item_quantity(&self, id: LineItemId, quantity: i64) -> Result<(), OrderManagementError>;

    /// Recalculates `item_total` and `total` from the order's line items and stores them.
    /// Returns the updated order.
    async fn update_totals(&self, order: OrderId) -> Result<Order, OrderManagementError>;

    async fn fetch_address(&self, id: AddressId) -> Result<Option<Address>, OrderManagementError>;

    async fn fetch_payments(&self, order: OrderId) -> Result<Vec<Payment>, OrderManagementError>;

    /// In a single atomic transaction:
    /// * marks the order as `complete`, stamping `completed_at` and storing its shipping method and totals,
    /// * attaches the payment in the `checkout` state, reusing an existing payment for the order if there is one.
    ///
    /// The update only applies to orders that are still incomplete. If the order was completed in the meantime,
    /// [`OrderManagementError::AlreadyCompleted`] is returned and nothing is changed.
    async fn complete_checkout(&self, completion: CheckoutCompletion) -> Result<Order, OrderManagementError>;

    /// Order cycles that are open at `now` and still have incomplete standing order orders.
    async fn fetch_order_cycles_awaiting_placement(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderCycle>, OrderManagementError>;
}
