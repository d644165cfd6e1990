use thiserror::Error;

use crate::db_types::{
    OrderCycle,
    OrderCycleId,
    PaymentMethod,
    ScheduleId,
    ShippingMethod,
    ShopId,
    Variant,
    VariantId,
};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}

/// Queries against the product catalog and the shop's checkout configuration.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn fetch_variant(&self, id: VariantId) -> Result<Option<Variant>, CatalogError>;

    async fn fetch_order_cycle(&self, id: OrderCycleId) -> Result<Option<OrderCycle>, CatalogError>;

    /// A variant is available to `shop` under `schedule` when some outgoing exchange in one of the schedule's order
    /// cycles delivers the variant to the shop.
    async fn variant_available_from(
        &self,
        variant: VariantId,
        shop: ShopId,
        schedule: ScheduleId,
    ) -> Result<bool, CatalogError>;

    /// The shipping methods the shop offers, in creation order.
    async fn shipping_methods_for_shop(&self, shop: ShopId) -> Result<Vec<ShippingMethod>, CatalogError>;

    /// The payment methods the shop accepts, in creation order.
    async fn payment_methods_for_shop(&self, shop: ShopId) -> Result<Vec<PaymentMethod>, CatalogError>;
}
