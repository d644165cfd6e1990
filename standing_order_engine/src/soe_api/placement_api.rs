//! The standing order placement job.
//!
//! When an order cycle opens, every draft order that was generated from a standing order for that cycle is placed:
//! 1. line item quantities are capped to the stock on hand ([`QuantityCapper`]),
//! 2. the order is taken through checkout to `complete`, with the payment left in `checkout` ([`CheckoutApi`]),
//! 3. exactly one placement email is dispatched for it ([`NotificationApi`]).
//!
//! Orders are processed one at a time. An order that fails step 1 or 2 is skipped and reported in the
//! [`PlacementSummary`]; it never stops the remaining orders from being placed.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ChangesMap, Order, OrderCycleId},
    events::EventProducers,
    order_objects::{PlacedOrder, PlacementSummary, SkippedOrder},
    soe_api::{
        checkout_api::{CheckoutApi, ConfirmationPolicy},
        errors::{PlacementError, SelectionError},
        notification_api::NotificationApi,
        quantity_capper::QuantityCapper,
    },
    traits::{CatalogManagement, InventoryOracle, NotificationOutbox, OrderManagement},
};

pub struct PlacementApi<B> {
    db: B,
    capper: QuantityCapper<B>,
    checkout: CheckoutApi<B>,
    notifications: NotificationApi<B>,
}

impl<B> Debug for PlacementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlacementApi")
    }
}

impl<B: Clone> PlacementApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let capper = QuantityCapper::new(db.clone());
        let checkout = CheckoutApi::new(db.clone(), producers.clone());
        let notifications = NotificationApi::new(db.clone(), producers);
        Self { db, capper, checkout, notifications }
    }
}

impl<B> PlacementApi<B>
where B: OrderManagement + InventoryOracle + CatalogManagement + NotificationOutbox
{
    /// The orders the job will place for the cycle: incomplete orders in that cycle that are linked to a standing
    /// order. Completed orders, orders in other cycles and one-off orders are never selected.
    pub async fn select_orders(&self, order_cycle: OrderCycleId) -> Result<Vec<Order>, SelectionError> {
        let orders = self
            .db
            .fetch_placeable_orders(order_cycle)
            .await
            .map_err(|e| SelectionError::QueryFailed { order_cycle, reason: e.to_string() })?;
        debug!("📦️ {} standing order orders selected for order cycle {order_cycle}", orders.len());
        Ok(orders)
    }

    /// Places every selected order for the order cycle and reports what happened to each.
    ///
    /// Only a failure to select the orders is returned as an error. Per-order failures are logged, recorded in the
    /// summary as skipped, and followed by a best-effort failure notification. Orders that another run completed in
    /// the meantime are skipped without a notification.
    pub async fn place_orders_for_cycle(&self, order_cycle: OrderCycleId) -> Result<PlacementSummary, SelectionError> {
        info!("📦️ Placing standing orders for order cycle {order_cycle}");
        let orders = self.select_orders(order_cycle).await?;
        let mut summary = PlacementSummary::new(order_cycle);
        for order in orders {
            match self.process(&order).await {
                Ok(placed) => summary.placed.push(placed),
                Err(e) if e.is_already_completed() => {
                    info!("📦️ Order {} [{}] was completed by another run. Skipping.", order.id, order.number);
                    summary.skipped.push(SkippedOrder {
                        order_id: order.id,
                        number: order.number.clone(),
                        reason: e.to_string(),
                    });
                },
                Err(e) => {
                    warn!("📦️ Order {} [{}] could not be placed and was skipped. {e}", order.id, order.number);
                    self.notify_failure(&order, &e).await;
                    summary.skipped.push(SkippedOrder {
                        order_id: order.id,
                        number: order.number.clone(),
                        reason: e.to_string(),
                    });
                },
            }
        }
        info!("📦️ {summary}");
        Ok(summary)
    }

    /// Caps, completes and notifies a single order.
    ///
    /// Capped quantities are not rolled back if completion fails. A notification failure is logged and reported
    /// through [`PlacedOrder::notified`]; the order stays complete.
    pub async fn process(&self, order: &Order) -> Result<PlacedOrder, PlacementError> {
        let changes: ChangesMap = self.capper.cap_quantity_and_store_changes(order).await?;
        let completed = self.checkout.advance_to_complete(order, ConfirmationPolicy::Suppress).await?;
        let notified = match self.notifications.send_placement_email(&completed, &changes).await {
            Ok(_) => true,
            Err(e) => {
                error!("📦️ Order {} was placed, but the placement email could not be dispatched. {e}", completed.id);
                false
            },
        };
        Ok(PlacedOrder { order_id: completed.id, number: completed.number, changes, notified })
    }

    async fn notify_failure(&self, order: &Order, error: &PlacementError) {
        if let Err(e) = self.notifications.send_failure_email(order, &error.to_string()).await {
            error!("📦️ Could not dispatch the failure notification for order {}. {e}", order.id);
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        db_types::{
            Address,
            AddressId,
            LineItem,
            LineItemId,
            Money,
            NewNotification,
            NewOrderCycle,
            Notification,
            NotificationKind,
            OrderCycle,
            OrderId,
            Payment,
            PaymentMethod,
            PaymentState,
            ScheduleId,
            ShippingMethod,
            ShopId,
            StockLevel,
            Variant,
            VariantId,
        },
        order_objects::OrderQueryFilter,
        traits::{CatalogError, CheckoutCompletion, InventoryError, OrderManagementError, OutboxError},
        test_utils::{
            fixtures::Market,
            hooks::{drain, EventRecorder},
            prepare_env::{prepare_test_env, random_db_path, teardown},
        },
        SqliteDatabase,
    };

    async fn market() -> Market {
        let db = prepare_test_env(&random_db_path()).await;
        Market::new(db).await
    }

    fn ids(orders: &[Order]) -> Vec<OrderId> {
        orders.iter().map(|o| o.id).collect()
    }

    #[tokio::test]
    async fn selects_only_incomplete_linked_orders_in_the_cycle() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 100).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 1).await;
        let week2 = market.add_order_cycle(NewOrderCycle::new("Week 2", market.hub)).await;

        let pending = market.generate_order(&so, "R400").await;
        let completed = market.generate_order(&so, "R401").await;
        CheckoutApi::new(market.db.clone(), EventProducers::default())
            .advance_to_complete(&completed, ConfirmationPolicy::Suppress)
            .await
            .unwrap();
        let _other_cycle = market.db.generate_order(&so, week2.id, "R402").await.unwrap();
        let _one_off = market.one_off_order("R403", &apples, 1).await;

        let api = PlacementApi::new(market.db.clone(), EventProducers::default());
        let selected = api.select_orders(market.order_cycle.id).await.unwrap();
        assert_eq!(ids(&selected), vec![pending.id]);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn places_every_order_with_one_notification_each() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 5).await;
        let pears = market.variant("Pears", 400, 2).await;
        let alice = market.standing_order("alice@example.com").await;
        market.subscribe(&alice, &apples, 3).await;
        let bob = market.standing_order("bob@example.com").await;
        market.subscribe(&bob, &pears, 3).await;
        let alice_order = market.generate_order(&alice, "R410").await;
        let bob_order = market.generate_order(&bob, "R411").await;

        let recorder = EventRecorder::default();
        let (producers, tasks) = recorder.start(16);
        let api = PlacementApi::new(market.db.clone(), producers);
        let summary = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        drop(api);
        drain(tasks).await;

        assert_eq!(summary.placed_count(), 2);
        assert_eq!(summary.skipped_count(), 0);
        assert_eq!(summary.capped_count(), 1);
        assert_eq!(summary.unnotified_count(), 0);

        for order in [&alice_order, &bob_order] {
            let stored = market.db.fetch_order(order.id).await.unwrap().unwrap();
            assert!(stored.is_complete());
            let payments = market.db.fetch_payments(order.id).await.unwrap();
            assert!(payments.iter().all(|p| p.state == PaymentState::Checkout));
            let notifications = market.db.fetch_notifications_for_order(order.id).await.unwrap();
            assert_eq!(notifications.len(), 1);
        }
        let alice_note = &market.db.fetch_notifications_for_order(alice_order.id).await.unwrap()[0];
        assert_eq!(alice_note.kind, NotificationKind::Placement);
        let bob_note = &market.db.fetch_notifications_for_order(bob_order.id).await.unwrap()[0];
        assert_eq!(bob_note.kind, NotificationKind::Capped);
        assert_eq!(bob_note.changes[0].original_quantity, 3);

        assert_eq!(recorder.placement_emails().len(), 2);
        assert!(recorder.confirmations().is_empty());
        assert!(recorder.failures().is_empty());
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn a_failing_order_does_not_stop_the_others() {
        let market = market().await;
        let pears = market.variant("Pears", 400, 1).await;
        let apples = market.variant("Apples", 350, 10).await;
        let broken = market.standing_order_with("alice@example.com", |so| so.bill_address_id = None).await;
        market.subscribe(&broken, &pears, 3).await;
        let good = market.standing_order("bob@example.com").await;
        market.subscribe(&good, &apples, 2).await;
        let order_a = market.generate_order(&broken, "R420").await;
        let order_b = market.generate_order(&good, "R421").await;

        let recorder = EventRecorder::default();
        let (producers, tasks) = recorder.start(16);
        let api = PlacementApi::new(market.db.clone(), producers);
        let summary = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        drop(api);
        drain(tasks).await;

        assert!(summary.is_skipped(order_a.id));
        assert!(summary.is_placed(order_b.id));
        let a = market.db.fetch_order(order_a.id).await.unwrap().unwrap();
        assert!(!a.is_complete());
        assert!(market.db.fetch_payments(order_a.id).await.unwrap().is_empty());
        // Capping is not undone when completion fails
        let a_items = market.db.fetch_line_items(order_a.id).await.unwrap();
        assert_eq!(a_items[0].quantity, 1);
        let a_notes = market.db.fetch_notifications_for_order(order_a.id).await.unwrap();
        assert_eq!(a_notes.len(), 1);
        assert_eq!(a_notes[0].kind, NotificationKind::Failure);

        assert!(market.db.fetch_order(order_b.id).await.unwrap().unwrap().is_complete());
        let emails = recorder.placement_emails();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].order.id, order_b.id);
        assert_eq!(recorder.failures().len(), 1);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn running_twice_is_a_no_op() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 2).await;
        let order = market.generate_order(&so, "R430").await;

        let api: PlacementApi<SqliteDatabase> = PlacementApi::new(market.db.clone(), EventProducers::default());
        let first = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        assert_eq!(first.placed_count(), 1);
        let second = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        assert_eq!(second.processed_count(), 0);
        assert_eq!(market.db.fetch_notifications_for_order(order.id).await.unwrap().len(), 1);
        assert_eq!(market.db.fetch_payments(order.id).await.unwrap().len(), 1);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn an_order_completed_elsewhere_is_skipped_quietly() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 2).await;
        let order = market.generate_order(&so, "R440").await;
        // Another run completes the order after it was selected, and then stock runs low
        CheckoutApi::new(market.db.clone(), EventProducers::default())
            .advance_to_complete(&order, ConfirmationPolicy::Suppress)
            .await
            .unwrap();
        market.db.set_count_on_hand(apples.id, 1).await.unwrap();

        let api = PlacementApi::new(market.db.clone(), EventProducers::default());
        let err = api.process(&order).await.unwrap_err();
        assert!(err.is_already_completed(), "{err}");
        assert!(market.db.fetch_notifications_for_order(order.id).await.unwrap().is_empty());
        // The completed order is left exactly as it was placed
        let items = market.db.fetch_line_items(order.id).await.unwrap();
        assert_eq!(items[0].quantity, 2);
        let stored = market.db.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, Money::from(700));
        let payments = market.db.fetch_payments(order.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, stored.total);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn a_stock_lookup_failure_skips_only_that_order() {
        let market = market().await;
        let pears = market.variant("Pears", 400, 10).await;
        let apples = market.variant("Apples", 350, 10).await;
        let alice = market.standing_order("alice@example.com").await;
        market.subscribe(&alice, &pears, 1).await;
        let bob = market.standing_order("bob@example.com").await;
        market.subscribe(&bob, &apples, 1).await;
        let order_a = market.generate_order(&alice, "R450").await;
        let order_b = market.generate_order(&bob, "R451").await;

        let backend = FailingBackend { broken_variant: Some(pears.id), ..FailingBackend::new(market.db.clone()) };
        let api = PlacementApi::new(backend, EventProducers::default());
        let summary = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        assert!(summary.is_skipped(order_a.id));
        assert!(summary.skipped[0].reason.contains("Could not look up stock"), "{}", summary.skipped[0].reason);
        assert!(summary.is_placed(order_b.id));
        assert!(!market.db.fetch_order(order_a.id).await.unwrap().unwrap().is_complete());
        assert!(market.db.fetch_order(order_b.id).await.unwrap().unwrap().is_complete());
        let a_notes = market.db.fetch_notifications_for_order(order_a.id).await.unwrap();
        assert_eq!(a_notes.len(), 1);
        assert_eq!(a_notes[0].kind, NotificationKind::Failure);
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn a_selection_failure_is_returned() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 1).await;
        let order = market.generate_order(&so, "R460").await;

        let backend = FailingBackend { broken_selection: true, ..FailingBackend::new(market.db.clone()) };
        let api = PlacementApi::new(backend, EventProducers::default());
        let err = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap_err();
        let SelectionError::QueryFailed { order_cycle, .. } = err;
        assert_eq!(order_cycle, market.order_cycle.id);
        assert!(!market.db.fetch_order(order.id).await.unwrap().unwrap().is_complete());
        teardown(market.db).await;
    }

    #[tokio::test]
    async fn a_notification_failure_leaves_the_order_complete() {
        let market = market().await;
        let apples = market.variant("Apples", 350, 10).await;
        let so = market.standing_order("alice@example.com").await;
        market.subscribe(&so, &apples, 1).await;
        let order = market.generate_order(&so, "R470").await;

        let backend = FailingBackend { broken_outbox: Some(order.id), ..FailingBackend::new(market.db.clone()) };
        let api = PlacementApi::new(backend, EventProducers::default());
        let summary = api.place_orders_for_cycle(market.order_cycle.id).await.unwrap();
        assert_eq!(summary.placed_count(), 1);
        assert_eq!(summary.unnotified_count(), 1);
        assert!(!summary.placed[0].notified);
        assert!(market.db.fetch_order(order.id).await.unwrap().unwrap().is_complete());
        assert!(market.db.fetch_notifications_for_order(order.id).await.unwrap().is_empty());
        teardown(market.db).await;
    }

    /// Delegates to SQLite, but fails on demand for a chosen variant, order or query.
    #[derive(Clone)]
    struct FailingBackend {
        db: SqliteDatabase,
        broken_variant: Option<VariantId>,
        broken_outbox: Option<OrderId>,
        broken_selection: bool,
    }

    impl FailingBackend {
        fn new(db: SqliteDatabase) -> Self {
            Self { db, broken_variant: None, broken_outbox: None, broken_selection: false }
        }
    }

    impl OrderManagement for FailingBackend {
        fn url(&self) -> &str {
            self.db.url()
        }

        async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, OrderManagementError> {
            self.db.fetch_order(id).await
        }

        async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderManagementError> {
            if self.broken_selection {
                return Err(OrderManagementError::DatabaseError("connection reset".into()));
            }
            self.db.fetch_orders(query).await
        }

        async fn fetch_line_items(&self, order: OrderId) -> Result<Vec<LineItem>, OrderManagementError> {
            self.db.fetch_line_items(order).await
        }

        async fn fetch_line_item(&self, id: LineItemId) -> Result<Option<LineItem>, OrderManagementError> {
            self.db.fetch_line_item(id).await
        }

        async fn update_line_item_quantity(&self, id: LineItemId, quantity: i64) -> Result<(), OrderManagementError> {
            self.db.update_line_item_quantity(id, quantity).await
        }

        async fn update_totals(&self, order: OrderId) -> Result<Order, OrderManagementError> {
            self.db.update_totals(order).await
        }

        async fn fetch_address(&self, id: AddressId) -> Result<Option<Address>, OrderManagementError> {
            self.db.fetch_address(id).await
        }

        async fn fetch_payments(&self, order: OrderId) -> Result<Vec<Payment>, OrderManagementError> {
            self.db.fetch_payments(order).await
        }

        async fn complete_checkout(&self, completion: CheckoutCompletion) -> Result<Order, OrderManagementError> {
            self.db.complete_checkout(completion).await
        }

        async fn fetch_order_cycles_awaiting_placement(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<OrderCycle>, OrderManagementError> {
            self.db.fetch_order_cycles_awaiting_placement(now).await
        }
    }

    impl InventoryOracle for FailingBackend {
        async fn stock_level(&self, variant: VariantId) -> Result<StockLevel, InventoryError> {
            if self.broken_variant == Some(variant) {
                return Err(InventoryError::DatabaseError("stock service unavailable".into()));
            }
            self.db.stock_level(variant).await
        }

        fn backorders_allowed(&self) -> bool {
            self.db.backorders_allowed()
        }
    }

    impl CatalogManagement for FailingBackend {
        async fn fetch_variant(&self, id: VariantId) -> Result<Option<Variant>, CatalogError> {
            self.db.fetch_variant(id).await
        }

        async fn fetch_order_cycle(&self, id: OrderCycleId) -> Result<Option<OrderCycle>, CatalogError> {
            self.db.fetch_order_cycle(id).await
        }

        async fn variant_available_from(
            &self,
            variant: VariantId,
            shop: ShopId,
            schedule: ScheduleId,
        ) -> Result<bool, CatalogError> {
            self.db.variant_available_from(variant, shop, schedule).await
        }

        async fn shipping_methods_for_shop(&self, shop: ShopId) -> Result<Vec<ShippingMethod>, CatalogError> {
            self.db.shipping_methods_for_shop(shop).await
        }

        async fn payment_methods_for_shop(&self, shop: ShopId) -> Result<Vec<PaymentMethod>, CatalogError> {
            self.db.payment_methods_for_shop(shop).await
        }
    }

    impl NotificationOutbox for FailingBackend {
        async fn record_notification(&self, notification: NewNotification) -> Result<Notification, OutboxError> {
            if self.broken_outbox == Some(notification.order_id) {
                return Err(OutboxError::DatabaseError("outbox is read-only".into()));
            }
            self.db.record_notification(notification).await
        }

        async fn fetch_notifications_for_order(&self, order: OrderId) -> Result<Vec<Notification>, OutboxError> {
            self.db.fetch_notifications_for_order(order).await
        }
    }
}
