//! Reduces line item quantities to what the inventory can actually supply.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ChangesMap, Order},
    soe_api::errors::CapError,
    traits::{InventoryOracle, OrderManagement, OrderManagementError},
};

pub struct QuantityCapper<B> {
    db: B,
}

impl<B> Debug for QuantityCapper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QuantityCapper")
    }
}

impl<B> QuantityCapper<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> QuantityCapper<B>
where B: OrderManagement + InventoryOracle
{
    /// Caps every line item of the order to its variant's stock on hand.
    ///
    /// * If backorders are allowed globally, nothing changes and the returned map is empty.
    /// * Line items for on-demand variants, and line items whose quantity the stock covers, are left alone.
    /// * Otherwise the quantity is set to the stock on hand (never below zero) and persisted straight away. The original
    ///   quantity is recorded in the returned map against the line item.
    ///
    /// Line items capped to zero stay on the order. Once capping is done, the order totals are recalculated.
    ///
    /// Completed orders are never touched. The order is re-read first, and [`CapError::AlreadyCompleted`] is returned
    /// if it was completed after `order` was fetched.
    ///
    /// A failure part way through leaves the quantities capped so far in place.
    pub async fn cap_quantity_and_store_changes(&self, order: &Order) -> Result<ChangesMap, CapError> {
        let mut changes = ChangesMap::new();
        let current = self
            .db
            .fetch_order(order.id)
            .await
            .map_err(|e| CapError::LineItemsUnavailable { order: order.id, reason: e.to_string() })?
            .ok_or(CapError::OrderNotFound(order.id))?;
        if current.is_complete() {
            debug!("✂️ Order {} has already been completed. It will not be capped", order.id);
            return Err(CapError::AlreadyCompleted(order.id));
        }
        if self.db.backorders_allowed() {
            trace!("✂️ Backorders are allowed. Order {} is not capped", order.id);
            return Ok(changes);
        }
        let items = self
            .db
            .fetch_line_items(order.id)
            .await
            .map_err(|e| CapError::LineItemsUnavailable { order: order.id, reason: e.to_string() })?;
        for item in items {
            let stock = self
                .db
                .stock_level(item.variant_id)
                .await
                .map_err(|source| CapError::StockLookup { variant: item.variant_id, source })?;
            let Some(capped) = stock.cap(item.quantity) else {
                continue;
            };
            self.db
                .update_line_item_quantity(item.id, capped)
                .await
                .map_err(|source| match source {
                    OrderManagementError::AlreadyCompleted(id) => CapError::AlreadyCompleted(id),
                    source => CapError::Persistence { line_item: item.id, source },
                })?;
            info!(
                "✂️ Line item {} on order {} capped from {} to {capped} (variant {})",
                item.id, order.id, item.quantity, item.variant_id
            );
            changes.record(item.id, item.quantity);
        }
        if !changes.is_empty() {
            let updated = self
                .db
                .update_totals(order.id)
                .await
                .map_err(|source| match source {
                    OrderManagementError::AlreadyCompleted(id) => CapError::AlreadyCompleted(id),
                    source => CapError::Totals { order: order.id, source },
                })?;
            debug!("✂️ Order {} totals are now {} after capping {} line items", order.id, updated.total, changes.len());
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        db_types::Money,
        events::EventProducers,
        test_utils::{
            fixtures::Market,
            prepare_env::{prepare_test_env, random_db_path, teardown},
        },
        CheckoutApi,
        ConfirmationPolicy,
        SqliteDatabase,
    };

    async fn market() -> Market {
        let db = prepare_test_env(&random_db_path()).await;
        Market::new(db).await
    }

    async fn quantities(db: &SqliteDatabase, order: &Order) -> Vec<i64> {
        db.fetch_line_items(order.id).await.unwrap().into_iter().map(|li| li.quantity).collect()
    }

    #[tokio::test]
    async fn sufficient_stock_is_left_alone() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 5).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 3).await;
        let order = market.generate_order(&so, "R100").await;

        let capper = QuantityCapper::new(market.db.clone());
        let changes = capper.cap_quantity_and_store_changes(&order).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(quantities(&market.db, &order).await, vec![3]);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn insufficient_stock_is_capped_and_recorded() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 5).await;
        let pears = market.variant("Pears", 400, 2).await;
        let plums = market.variant("Plums", 500, 0).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 3).await;
        market.subscribe(&so, &pears, 3).await;
        market.subscribe(&so, &plums, 3).await;
        let order = market.generate_order(&so, "R101").await;
        let items = market.db.fetch_line_items(order.id).await.unwrap();
        let (li1, li2, li3) = (items[0].id, items[1].id, items[2].id);

        let capper = QuantityCapper::new(market.db.clone());
        let changes = capper.cap_quantity_and_store_changes(&order).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.get(&li1), None);
        assert_eq!(changes.get(&li2), Some(3));
        assert_eq!(changes.get(&li3), Some(3));
        // Zero-stock items stay on the order
        assert_eq!(quantities(&market.db, &order).await, vec![3, 2, 0]);
        let order = market.db.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.item_total, Money::from(3 * 350 + 2 * 400));
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn oversold_stock_caps_to_zero() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 5).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 3).await;
        let order = market.generate_order(&so, "R102").await;
        market.db.set_count_on_hand(apples.id, -2).await.unwrap();

        let capper = QuantityCapper::new(market.db.clone());
        let changes = capper.cap_quantity_and_store_changes(&order).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(quantities(&market.db, &order).await, vec![0]);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn backorders_disable_capping() {
        let market = market().await;
        let pears = market.variant("Pears", 400, 1).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &pears, 4).await;
        let order = market.generate_order(&so, "R103").await;

        let capper = QuantityCapper::new(market.db.clone().with_backorders(true));
        let changes = capper.cap_quantity_and_store_changes(&order).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(quantities(&market.db, &order).await, vec![4]);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn completed_orders_are_never_capped() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 2).await;
        let order = market.generate_order(&so, "R105").await;
        CheckoutApi::new(market.db.clone(), EventProducers::default())
            .advance_to_complete(&order, ConfirmationPolicy::Suppress)
            .await
            .unwrap();
        // Stock runs low after the order was placed
        market.db.set_count_on_hand(apples.id, 1).await.unwrap();

        let capper = QuantityCapper::new(market.db.clone());
        let err = capper.cap_quantity_and_store_changes(&order).await.unwrap_err();
        assert!(matches!(err, CapError::AlreadyCompleted(id) if id == order.id), "{err}");
        assert_eq!(quantities(&market.db, &order).await, vec![2]);
        let stored = market.db.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, Money::from(700));
        let payments = market.db.fetch_payments(order.id).await.unwrap();
        assert_eq!(payments[0].amount, stored.total);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn on_demand_variants_are_never_capped() {
        let market = market().await;
        let bread = market.on_demand_variant("Sourdough", 800).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &bread, 10).await;
        let order = market.generate_order(&so, "R104").await;

        let capper = QuantityCapper::new(market.db.clone());
        let changes = capper.cap_quantity_and_store_changes(&order).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(quantities(&market.db, &order).await, vec![10]);
        teardown(market.db).await;
    }
}
