use thiserror::Error;

use crate::db_types::{StockLevel, VariantId};

#[derive(Debug, Clone, Error)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Variant {0} does not exist")]
    VariantNotFound(VariantId),
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        InventoryError::DatabaseError(e.to_string())
    }
}

/// Reports live stock for sellable variants.
#[allow(async_fn_in_trait)]
pub trait InventoryOracle {
    /// The current stock level of the variant.
    async fn stock_level(&self, variant: VariantId) -> Result<StockLevel, InventoryError>;

    /// When backorders are allowed globally, quantities are never capped to stock.
    fn backorders_allowed(&self) -> bool;
}
