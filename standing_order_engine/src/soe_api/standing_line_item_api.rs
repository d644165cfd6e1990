use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{ScheduleId, ShopId, StandingLineItem, StandingLineItemId, VariantId},
    soe_api::errors::StandingLineItemError,
    traits::{CatalogManagement, StandingOrderError, StandingOrderManagement},
};

/// Validation and quantity changes for the line items of a standing order.
pub struct StandingLineItemApi<B> {
    db: B,
}

impl<B> Debug for StandingLineItemApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StandingLineItemApi")
    }
}

impl<B> StandingLineItemApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> StandingLineItemApi<B>
where B: StandingOrderManagement + CatalogManagement
{
    /// Whether `shop` can receive `variant` through an outgoing exchange in any order cycle of `schedule`.
    pub async fn available_from(
        &self,
        variant: VariantId,
        shop: ShopId,
        schedule: ScheduleId,
    ) -> Result<bool, StandingLineItemError> {
        Ok(self.db.variant_available_from(variant, shop, schedule).await?)
    }

    /// Checks that the quantity is positive, and that the variant exists and is available to the standing order's
    /// shop under its schedule.
    pub async fn validate(&self, item: &StandingLineItem) -> Result<(), StandingLineItemError> {
        if item.quantity <= 0 {
            return Err(StandingLineItemError::InvalidQuantity(item.quantity));
        }
        let so = self
            .db
            .fetch_standing_order(item.standing_order_id)
            .await?
            .ok_or(StandingOrderError::StandingOrderNotFound(item.standing_order_id))?;
        if self.db.fetch_variant(item.variant_id).await?.is_none() {
            return Err(StandingLineItemError::VariantNotFound(item.variant_id));
        }
        if !self.available_from(item.variant_id, so.shop_id, so.schedule_id).await? {
            return Err(StandingLineItemError::VariantUnavailable(item.variant_id));
        }
        Ok(())
    }

    /// Validates and stores a new quantity for the standing line item, then copies it into the orders already
    /// generated from the standing order. Returns the number of order line items that changed.
    pub async fn change_quantity(&self, id: StandingLineItemId, quantity: i64) -> Result<u64, StandingLineItemError> {
        let mut item = self.db.fetch_standing_line_item(id).await?.ok_or(StandingLineItemError::NotFound(id))?;
        item.quantity = quantity;
        self.validate(&item).await?;
        let item = self.db.update_standing_line_item_quantity(id, quantity).await?;
        debug!("📦️ Standing line item {id} quantity changed to {quantity}");
        self.update_line_items(&item).await
    }

    /// Copies the standing line item's quantity onto the matching line items of every incomplete order generated from
    /// its standing order, leaving orders in closed order cycles alone.
    pub async fn update_line_items(&self, item: &StandingLineItem) -> Result<u64, StandingLineItemError> {
        let updated = self.db.update_pending_line_items(item, Utc::now()).await?;
        info!("📦️ {updated} pending line items updated from standing line item {}", item.id);
        Ok(updated)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;
    use crate::{
        db_types::{LineItem, Money, NewOrderCycle, NewVariant},
        test_utils::{
            fixtures::Market,
            prepare_env::{prepare_test_env, random_db_path, teardown},
        },
        CheckoutApi,
        ConfirmationPolicy,
        OrderManagement,
    };

    async fn market() -> Market {
        let db = prepare_test_env(&random_db_path()).await;
        Market::new(db).await
    }

    #[tokio::test]
    async fn availability_requires_an_outgoing_exchange_in_the_schedule() {
        let market = market().await;
        let api = StandingLineItemApi::new(market.db.clone());
        let offered = market.variant("Apples", 350, 10).await;
        assert!(api.available_from(offered.id, market.shop, market.schedule).await.unwrap());

        let hidden = market.db.create_variant(NewVariant::new("Quince", Money::from(900), 10)).await.unwrap();
        assert!(!api.available_from(hidden.id, market.shop, market.schedule).await.unwrap());

        let other_shop = market.db.create_shop("Elsewhere Co-op").await.unwrap();
        assert!(!api.available_from(offered.id, other_shop, market.schedule).await.unwrap());

        // Only outgoing exchanges make a variant available
        let incoming = market.db.create_variant(NewVariant::new("Figs", Money::from(600), 10)).await.unwrap();
        let mut conn = market.db.pool().acquire().await.unwrap();
        crate::sqlite::db::catalog::insert_exchange(
            market.order_cycle.id,
            market.hub,
            market.shop,
            true,
            &[incoming.id],
            &mut conn,
        )
        .await
        .unwrap();
        drop(conn);
        assert!(!api.available_from(incoming.id, market.shop, market.schedule).await.unwrap());

        // An exchange in a cycle outside the schedule does not count
        let stray = market.db.create_order_cycle(NewOrderCycle::new("Pop-up", market.hub)).await.unwrap();
        let pop_up = market.db.create_variant(NewVariant::new("Truffles", Money::from(5000), 1)).await.unwrap();
        market.db.create_outgoing_exchange(&stray, market.shop, &[pop_up.id]).await.unwrap();
        assert!(!api.available_from(pop_up.id, market.shop, market.schedule).await.unwrap());
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn validation() {
        let market = market().await;
        let api = StandingLineItemApi::new(market.db.clone());
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        let mut item = market.subscribe(&so, &apples, 2).await;
        api.validate(&item).await.unwrap();

        item.quantity = 0;
        let err = api.validate(&item).await.unwrap_err();
        assert!(matches!(err, StandingLineItemError::InvalidQuantity(0)), "{err}");

        let hidden = market.db.create_variant(NewVariant::new("Quince", Money::from(900), 10)).await.unwrap();
        item.quantity = 1;
        item.variant_id = hidden.id;
        let err = api.validate(&item).await.unwrap_err();
        assert!(matches!(err, StandingLineItemError::VariantUnavailable(_)), "{err}");

        item.variant_id = VariantId(9999);
        let err = api.validate(&item).await.unwrap_err();
        assert!(matches!(err, StandingLineItemError::VariantNotFound(_)), "{err}");

        let err = api.change_quantity(StandingLineItemId(9999), 3).await.unwrap_err();
        assert!(matches!(err, StandingLineItemError::NotFound(_)), "{err}");
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn quantity_changes_reach_pending_orders_only() {
        let market = market().await;
        let api = StandingLineItemApi::new(market.db.clone());
        let apples = market.variant("Apples", 350, 100).await;
        let so = market.standing_order("alice@example.com").await;
        let item = market.subscribe(&so, &apples, 2).await;

        let now = chrono::Utc::now();
        let closed = market
            .add_order_cycle(
                NewOrderCycle::new("Last week", market.hub)
                    .opening_at(now - Duration::days(8), Some(now - Duration::days(1))),
            )
            .await;
        let pending = market.generate_order(&so, "R500").await;
        let placed = market.generate_order(&so, "R501").await;
        CheckoutApi::new(market.db.clone(), Default::default())
            .advance_to_complete(&placed, ConfirmationPolicy::Suppress)
            .await
            .unwrap();
        let stale = market.db.generate_order(&so, closed.id, "R502").await.unwrap();

        let updated = api.change_quantity(item.id, 5).await.unwrap();
        assert_eq!(updated, 1);
        let stored = market.db.fetch_standing_line_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);

        let quantity = |items: Vec<LineItem>| items[0].quantity;
        assert_eq!(quantity(market.db.fetch_line_items(pending.id).await.unwrap()), 5);
        assert_eq!(quantity(market.db.fetch_line_items(placed.id).await.unwrap()), 2);
        assert_eq!(quantity(market.db.fetch_line_items(stale.id).await.unwrap()), 2);
        let pending = market.db.fetch_order(pending.id).await.unwrap().unwrap();
        assert_eq!(pending.total, Money::from(5 * 350));

        let err = api.change_quantity(item.id, -1).await.unwrap_err();
        assert!(matches!(err, StandingLineItemError::InvalidQuantity(-1)), "{err}");
        teardown(market.db).await;
    }
}
