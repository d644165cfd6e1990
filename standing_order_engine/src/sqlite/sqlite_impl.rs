//! `SqliteDatabase` is a concrete implementation of a standing order engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. It also carries a handful of inherent methods for seeding the catalog and generating orders, which the
//! order generator and the test fixtures use.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{catalog, db_url, line_items, new_pool, notifications, orders, standing_orders, variants};
use crate::{
    db_types::{
        Address,
        AddressId,
        CustomerId,
        ExchangeId,
        LineItem,
        LineItemId,
        NewNotification,
        NewOrder,
        NewOrderCycle,
        NewStandingOrder,
        NewVariant,
        Notification,
        Order,
        OrderCycle,
        OrderCycleId,
        OrderId,
        Payment,
        PaymentMethod,
        ScheduleId,
        ShippingMethod,
        ShopId,
        StandingLineItem,
        StandingLineItemId,
        StandingOrder,
        StandingOrderId,
        StockLevel,
        Variant,
        VariantId,
    },
    order_objects::OrderQueryFilter,
    traits::{
        CatalogError,
        CatalogManagement,
        CheckoutCompletion,
        InventoryError,
        InventoryOracle,
        NotificationOutbox,
        OrderManagement,
        OrderManagementError,
        OutboxError,
        StandingOrderError,
        StandingOrderManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    allow_backorders: bool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?}, backorders: {})", self.pool, self.allow_backorders)
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_orders(query, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_line_items(&self, order: OrderId) -> Result<Vec<LineItem>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let items = line_items::fetch_line_items_for_order(order, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_line_item(&self, id: LineItemId) -> Result<Option<LineItem>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let item = line_items::fetch_line_item(id, &mut conn).await?;
        Ok(item)
    }

    async fn update_line_item_quantity(&self, id: LineItemId, quantity: i64) -> Result<(), OrderManagementError> {
        if quantity < 0 {
            return Err(OrderManagementError::InvalidQuantity(quantity));
        }
        let mut conn = self.pool.acquire().await?;
        if line_items::update_quantity(id, quantity, &mut conn).await? {
            return Ok(());
        }
        match line_items::fetch_line_item(id, &mut conn).await? {
            Some(item) => Err(OrderManagementError::AlreadyCompleted(item.order_id)),
            None => Err(OrderManagementError::LineItemNotFound(id)),
        }
    }

    async fn update_totals(&self, order: OrderId) -> Result<Order, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(updated) = orders::update_totals(order, &mut conn).await? {
            return Ok(updated);
        }
        match orders::fetch_order(order, &mut conn).await? {
            Some(_) => Err(OrderManagementError::AlreadyCompleted(order)),
            None => Err(OrderManagementError::OrderNotFound(order)),
        }
    }

    async fn fetch_address(&self, id: AddressId) -> Result<Option<Address>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let address = orders::fetch_address(id, &mut conn).await?;
        Ok(address)
    }

    async fn fetch_payments(&self, order: OrderId) -> Result<Vec<Payment>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let payments = orders::fetch_payments(order, &mut conn).await?;
        Ok(payments)
    }

    /// Takes the resolved checkout and, in a single atomic transaction,
    /// * marks the order as complete, provided nobody has completed it in the meantime,
    /// * attaches the payment in the `checkout` state.
    /// If either step fails, the transaction is dropped and the order is left exactly as it was.
    async fn complete_checkout(&self, completion: CheckoutCompletion) -> Result<Order, OrderManagementError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::complete_checkout(completion, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} [{}] completed checkout. Total: {}", order.id, order.number, order.total);
        Ok(order)
    }

    async fn fetch_order_cycles_awaiting_placement(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderCycle>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let cycles = orders::fetch_order_cycles_awaiting_placement(now, &mut conn).await?;
        Ok(cycles)
    }
}

impl InventoryOracle for SqliteDatabase {
    async fn stock_level(&self, variant: VariantId) -> Result<StockLevel, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let variant =
            variants::fetch_variant(variant, &mut conn).await?.ok_or(InventoryError::VariantNotFound(variant))?;
        Ok(variant.stock_level())
    }

    fn backorders_allowed(&self) -> bool {
        self.allow_backorders
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_variant(&self, id: VariantId) -> Result<Option<Variant>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let variant = variants::fetch_variant(id, &mut conn).await?;
        Ok(variant)
    }

    async fn fetch_order_cycle(&self, id: OrderCycleId) -> Result<Option<OrderCycle>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let cycle = catalog::fetch_order_cycle(id, &mut conn).await?;
        Ok(cycle)
    }

    async fn variant_available_from(
        &self,
        variant: VariantId,
        shop: ShopId,
        schedule: ScheduleId,
    ) -> Result<bool, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let available = catalog::variant_available_from(variant, shop, schedule, &mut conn).await?;
        Ok(available)
    }

    async fn shipping_methods_for_shop(&self, shop: ShopId) -> Result<Vec<ShippingMethod>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let methods = catalog::fetch_shipping_methods(shop, &mut conn).await?;
        Ok(methods)
    }

    async fn payment_methods_for_shop(&self, shop: ShopId) -> Result<Vec<PaymentMethod>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let methods = catalog::fetch_payment_methods(shop, &mut conn).await?;
        Ok(methods)
    }
}

impl StandingOrderManagement for SqliteDatabase {
    async fn fetch_standing_order(&self, id: StandingOrderId) -> Result<Option<StandingOrder>, StandingOrderError> {
        let mut conn = self.pool.acquire().await?;
        let so = standing_orders::fetch_standing_order(id, &mut conn).await?;
        Ok(so)
    }

    async fn fetch_standing_order_for_order(
        &self,
        order: OrderId,
    ) -> Result<Option<StandingOrder>, StandingOrderError> {
        let mut conn = self.pool.acquire().await?;
        let so = standing_orders::fetch_standing_order_for_order(order, &mut conn).await?;
        Ok(so)
    }

    async fn fetch_standing_line_item(
        &self,
        id: StandingLineItemId,
    ) -> Result<Option<StandingLineItem>, StandingOrderError> {
        let mut conn = self.pool.acquire().await?;
        let item = standing_orders::fetch_standing_line_item(id, &mut conn).await?;
        Ok(item)
    }

    async fn fetch_standing_line_items(
        &self,
        standing_order: StandingOrderId,
    ) -> Result<Vec<StandingLineItem>, StandingOrderError> {
        let mut conn = self.pool.acquire().await?;
        let items = standing_orders::fetch_standing_line_items(standing_order, &mut conn).await?;
        Ok(items)
    }

    async fn link_order(&self, standing_order: StandingOrderId, order: OrderId) -> Result<(), StandingOrderError> {
        let mut tx = self.pool.begin().await?;
        let so = standing_orders::fetch_standing_order(standing_order, &mut tx)
            .await?
            .ok_or(StandingOrderError::StandingOrderNotFound(standing_order))?;
        let order = orders::fetch_order(order, &mut tx).await?.ok_or(StandingOrderError::OrderNotFound(order))?;
        let cycle = order.order_cycle_id.ok_or(StandingOrderError::OrderWithoutCycle(order.id))?;
        if !catalog::schedule_contains(so.schedule_id, cycle, &mut tx).await? {
            return Err(StandingOrderError::OrderCycleNotInSchedule { standing_order, order_cycle: cycle });
        }
        standing_orders::link_order(standing_order, order.id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_standing_line_item_quantity(
        &self,
        id: StandingLineItemId,
        quantity: i64,
    ) -> Result<StandingLineItem, StandingOrderError> {
        let mut conn = self.pool.acquire().await?;
        standing_orders::update_standing_line_item_quantity(id, quantity, &mut conn)
            .await?
            .ok_or(StandingOrderError::StandingLineItemNotFound(id))
    }

    async fn update_pending_line_items(
        &self,
        item: &StandingLineItem,
        now: DateTime<Utc>,
    ) -> Result<u64, StandingOrderError> {
        let mut tx = self.pool.begin().await?;
        let updated = standing_orders::update_pending_line_items(item, now, &mut tx).await?;
        let pending = orders::fetch_orders(
            OrderQueryFilter::default().with_standing_order(item.standing_order_id).incomplete(),
            &mut tx,
        )
        .await?;
        for order in pending {
            orders::update_totals(order.id, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Standing line item {} propagated to {updated} pending line items", item.id);
        Ok(updated)
    }
}

impl NotificationOutbox for SqliteDatabase {
    async fn record_notification(&self, notification: NewNotification) -> Result<Notification, OutboxError> {
        let mut conn = self.pool.acquire().await?;
        let notification = notifications::insert_notification(notification, &mut conn).await?;
        trace!("🗃️ Notification {} ({}) recorded for order {}", notification.id, notification.kind, notification.order_id);
        Ok(notification)
    }

    async fn fetch_notifications_for_order(&self, order: OrderId) -> Result<Vec<Notification>, OutboxError> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch_notifications_for_order(order, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, allow_backorders: false })
    }

    /// Sets the global backorder policy reported through [`InventoryOracle::backorders_allowed`].
    pub fn with_backorders(mut self, allow: bool) -> Self {
        self.allow_backorders = allow;
        self
    }

    /// Runs the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_shop(&self, name: &str) -> Result<ShopId, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_shop(name, &mut conn).await
    }

    pub async fn create_customer(&self, email: &str, shop: ShopId) -> Result<CustomerId, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_customer(email, shop, &mut conn).await
    }

    pub async fn create_variant(&self, variant: NewVariant) -> Result<Variant, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        variants::insert_variant(variant, &mut conn).await
    }

    pub async fn set_count_on_hand(&self, variant: VariantId, count: i64) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        variants::set_count_on_hand(variant, count, &mut conn).await
    }

    pub async fn create_order_cycle(&self, cycle: NewOrderCycle) -> Result<OrderCycle, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_order_cycle(cycle, &mut conn).await
    }

    pub async fn create_schedule(&self, name: &str, order_cycles: &[OrderCycleId]) -> Result<ScheduleId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = catalog::insert_schedule(name, order_cycles, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Creates an outgoing exchange from the coordinator to `shop`, offering the given variants in the order cycle.
    pub async fn create_outgoing_exchange(
        &self,
        order_cycle: &OrderCycle,
        shop: ShopId,
        variants: &[VariantId],
    ) -> Result<ExchangeId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id =
            catalog::insert_exchange(order_cycle.id, order_cycle.coordinator_id, shop, false, variants, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn create_shipping_method(&self, shop: ShopId, name: &str) -> Result<ShippingMethod, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_shipping_method(shop, name, &mut conn).await
    }

    pub async fn create_payment_method(&self, shop: ShopId, name: &str) -> Result<PaymentMethod, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_payment_method(shop, name, &mut conn).await
    }

    pub async fn create_address(&self, address: Address) -> Result<Address, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_address(address, &mut conn).await
    }

    pub async fn create_standing_order(&self, so: NewStandingOrder) -> Result<StandingOrder, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        standing_orders::insert_standing_order(so, &mut conn).await
    }

    pub async fn create_standing_line_item(
        &self,
        standing_order: StandingOrderId,
        variant: VariantId,
        quantity: i64,
    ) -> Result<StandingLineItem, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        standing_orders::insert_standing_line_item(standing_order, variant, quantity, &mut conn).await
    }

    /// Inserts a bare order, without linking it to a standing order.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    /// Adds a line item priced at the variant's current price, and refreshes the order totals.
    pub async fn add_line_item(
        &self,
        order: OrderId,
        variant: &Variant,
        quantity: i64,
    ) -> Result<LineItem, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let item = line_items::insert_line_item(order, variant.id, quantity, variant.price, &mut tx).await?;
        orders::update_totals(order, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Generates the draft order for one occurrence of a standing order, in a single transaction:
    /// * inserts the order with the standing order's customer, addresses, shipping and payment methods,
    /// * links it to the standing order,
    /// * copies each standing line item into a line item at the variant's current price,
    /// * stores the order totals.
    pub async fn generate_order(
        &self,
        standing_order: &StandingOrder,
        order_cycle: OrderCycleId,
        number: &str,
    ) -> Result<Order, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let new_order = NewOrder::new(number, standing_order.shop_id, order_cycle).for_standing_order(standing_order);
        let order = orders::insert_order(new_order, &mut tx).await?;
        standing_orders::link_order(standing_order.id, order.id, &mut tx).await?;
        let items = standing_orders::fetch_standing_line_items(standing_order.id, &mut tx).await?;
        for item in items {
            let Some(variant) = variants::fetch_variant(item.variant_id, &mut tx).await? else {
                warn!("🗃️ Standing line item {} refers to missing variant {}. Skipping.", item.id, item.variant_id);
                continue;
            };
            line_items::insert_line_item(order.id, variant.id, item.quantity, variant.price, &mut tx).await?;
        }
        let order = orders::update_totals(order.id, &mut tx).await?.ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;
        debug!("🗃️ Order {} [{}] generated for standing order {}", order.id, order.number, standing_order.id);
        Ok(order)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;
    use crate::{
        db_types::{Money, OrderState},
        events::EventProducers,
        test_utils::{
            fixtures::Market,
            prepare_env::{prepare_test_env, random_db_path, teardown},
        },
        CheckoutApi,
        ConfirmationPolicy,
    };

    #[tokio::test]
    async fn linking_checks_the_schedule() {
        let db = prepare_test_env(&random_db_path()).await;
        let market = Market::new(db).await;
        let so = market.standing_order("alice@example.com").await;
        let outsider = market.db.create_order_cycle(NewOrderCycle::new("Pop-up", market.hub)).await.unwrap();

        let order = market.db.create_order(NewOrder::new("R600", market.shop, outsider.id)).await.unwrap();
        let err = market.db.link_order(so.id, order.id).await.unwrap_err();
        assert!(matches!(err, StandingOrderError::OrderCycleNotInSchedule { .. }), "{err}");

        let order = market.db.create_order(NewOrder::new("R601", market.shop, market.order_cycle.id)).await.unwrap();
        market.db.link_order(so.id, order.id).await.unwrap();
        let linked = market.db.fetch_standing_order_for_order(order.id).await.unwrap();
        assert_eq!(linked.map(|s| s.id), Some(so.id));

        let err = market.db.link_order(StandingOrderId(999), order.id).await.unwrap_err();
        assert!(matches!(err, StandingOrderError::StandingOrderNotFound(_)), "{err}");
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn order_cycles_awaiting_placement() {
        let db = prepare_test_env(&random_db_path()).await;
        let market = Market::new(db).await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 1).await;
        let now = Utc::now();

        // Open, but nothing to place yet
        assert!(market.db.fetch_order_cycles_awaiting_placement(now).await.unwrap().is_empty());

        market.generate_order(&so, "R610").await;
        let future = market
            .add_order_cycle(
                NewOrderCycle::new("Next week", market.hub).opening_at(now + Duration::days(6), None),
            )
            .await;
        market.db.generate_order(&so, future.id, "R611").await.unwrap();

        let cycles = market.db.fetch_order_cycles_awaiting_placement(now).await.unwrap();
        assert_eq!(cycles.iter().map(|c| c.id).collect::<Vec<_>>(), vec![market.order_cycle.id]);
        let later = market.db.fetch_order_cycles_awaiting_placement(now + Duration::days(7)).await.unwrap();
        assert_eq!(later.iter().map(|c| c.id).collect::<Vec<_>>(), vec![future.id]);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn order_filters() {
        let db = prepare_test_env(&random_db_path()).await;
        let market = Market::new(db).await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 1).await;
        let linked = market.generate_order(&so, "R620").await;
        let one_off = market.one_off_order("R621", &apples, 2).await;

        let unlinked = market.db.fetch_orders(OrderQueryFilter::default().linked_to_standing_order(false)).await.unwrap();
        assert_eq!(unlinked.iter().map(|o| o.id).collect::<Vec<_>>(), vec![one_off.id]);
        let by_so = market.db.fetch_orders(OrderQueryFilter::default().with_standing_order(so.id)).await.unwrap();
        assert_eq!(by_so.iter().map(|o| o.id).collect::<Vec<_>>(), vec![linked.id]);
        let carts = market
            .db
            .fetch_orders(OrderQueryFilter::default().with_shop(market.shop).with_state(OrderState::Cart))
            .await
            .unwrap();
        assert_eq!(carts.len(), 2);
        assert_eq!(one_off.state, OrderState::Cart);

        let err = market.db.update_line_item_quantity(LineItemId(999), 1).await.unwrap_err();
        assert!(matches!(err, OrderManagementError::LineItemNotFound(_)), "{err}");
        let err = market.db.update_line_item_quantity(LineItemId(1), -1).await.unwrap_err();
        assert!(matches!(err, OrderManagementError::InvalidQuantity(-1)), "{err}");
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn completed_orders_are_frozen() {
        let db = prepare_test_env(&random_db_path()).await;
        let market = Market::new(db).await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 2).await;
        let order = market.generate_order(&so, "R630").await;
        CheckoutApi::new(market.db.clone(), EventProducers::default())
            .advance_to_complete(&order, ConfirmationPolicy::Suppress)
            .await
            .unwrap();
        let item = market.db.fetch_line_items(order.id).await.unwrap()[0].clone();

        let err = market.db.update_line_item_quantity(item.id, 1).await.unwrap_err();
        assert!(matches!(err, OrderManagementError::AlreadyCompleted(id) if id == order.id), "{err}");
        let err = market.db.update_totals(order.id).await.unwrap_err();
        assert!(matches!(err, OrderManagementError::AlreadyCompleted(_)), "{err}");
        let err = market.db.update_totals(OrderId(999)).await.unwrap_err();
        assert!(matches!(err, OrderManagementError::OrderNotFound(_)), "{err}");

        assert_eq!(market.db.fetch_line_item(item.id).await.unwrap().unwrap().quantity, 2);
        let stored = market.db.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, Money::from(700));
        teardown(market.db).await;
    }
}
