//! A small market to run the placement job against.
//!
//! [`Market::new`] sets up a coordinator hub and a distributor shop, an open order cycle inside a weekly schedule, one
//! shipping method, one payment method and a valid address. Variants, standing orders and their generated orders are
//! added per test.
use chrono::{Duration, Utc};

use crate::{
    db_types::{
        Address,
        Money,
        NewOrder,
        NewOrderCycle,
        NewStandingOrder,
        NewVariant,
        Order,
        OrderCycle,
        PaymentMethod,
        ScheduleId,
        ShippingMethod,
        ShopId,
        StandingLineItem,
        StandingOrder,
        Variant,
    },
    SqliteDatabase,
};

pub struct Market {
    pub db: SqliteDatabase,
    pub hub: ShopId,
    pub shop: ShopId,
    pub order_cycle: OrderCycle,
    pub schedule: ScheduleId,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub address: Address,
}

pub fn valid_address() -> Address {
    Address {
        firstname: "Mary".into(),
        lastname: "Smith".into(),
        address1: "14 Orchard Lane".into(),
        city: "Ballarat".into(),
        zipcode: "3350".into(),
        phone: "0400 000 000".into(),
        ..Default::default()
    }
}

impl Market {
    pub async fn new(db: SqliteDatabase) -> Self {
        let hub = db.create_shop("Highland Food Hub").await.expect("Error creating hub");
        let shop = db.create_shop("Green Grocer").await.expect("Error creating shop");
        let now = Utc::now();
        let cycle = NewOrderCycle::new("Week 1", hub).opening_at(now - Duration::hours(1), Some(now + Duration::days(6)));
        let order_cycle = db.create_order_cycle(cycle).await.expect("Error creating order cycle");
        let schedule = db.create_schedule("Weekly", &[order_cycle.id]).await.expect("Error creating schedule");
        let shipping_method = db.create_shipping_method(shop, "Farm gate pickup").await.expect("Error creating shipping");
        let payment_method = db.create_payment_method(shop, "Cash on pickup").await.expect("Error creating payment");
        let address = db.create_address(valid_address()).await.expect("Error creating address");
        Self { db, hub, shop, order_cycle, schedule, shipping_method, payment_method, address }
    }

    /// Adds an order cycle to the market's schedule.
    pub async fn add_order_cycle(&self, cycle: NewOrderCycle) -> OrderCycle {
        let cycle = self.db.create_order_cycle(cycle).await.expect("Error creating order cycle");
        sqlx::query("INSERT INTO schedule_order_cycles (schedule_id, order_cycle_id) VALUES ($1, $2)")
            .bind(self.schedule)
            .bind(cycle.id)
            .execute(self.db.pool())
            .await
            .expect("Error adding order cycle to schedule");
        cycle
    }

    /// Creates a variant with limited stock, offered to the shop in the market's order cycle.
    pub async fn variant(&self, name: &str, price: i64, count_on_hand: i64) -> Variant {
        self.offer(NewVariant::new(name, Money::from(price), count_on_hand)).await
    }

    pub async fn on_demand_variant(&self, name: &str, price: i64) -> Variant {
        self.offer(NewVariant::new(name, Money::from(price), 0).on_demand()).await
    }

    async fn offer(&self, variant: NewVariant) -> Variant {
        let variant = self.db.create_variant(variant).await.expect("Error creating variant");
        self.db
            .create_outgoing_exchange(&self.order_cycle, self.shop, &[variant.id])
            .await
            .expect("Error creating exchange");
        variant
    }

    /// A standing order with valid addresses, shipping and payment methods.
    pub async fn standing_order(&self, email: &str) -> StandingOrder {
        self.standing_order_with(email, |_| {}).await
    }

    /// A standing order that starts out valid and is then adjusted by `f` before it is stored.
    pub async fn standing_order_with<F: FnOnce(&mut NewStandingOrder)>(&self, email: &str, f: F) -> StandingOrder {
        let customer = self.db.create_customer(email, self.shop).await.expect("Error creating customer");
        let mut so = NewStandingOrder {
            shop_id: self.shop,
            customer_id: customer,
            schedule_id: self.schedule,
            shipping_method_id: Some(self.shipping_method.id),
            payment_method_id: Some(self.payment_method.id),
            bill_address_id: Some(self.address.id),
            ship_address_id: Some(self.address.id),
        };
        f(&mut so);
        self.db.create_standing_order(so).await.expect("Error creating standing order")
    }

    pub async fn subscribe(&self, so: &StandingOrder, variant: &Variant, quantity: i64) -> StandingLineItem {
        self.db.create_standing_line_item(so.id, variant.id, quantity).await.expect("Error creating standing line item")
    }

    /// The draft order for the standing order in the market's order cycle.
    pub async fn generate_order(&self, so: &StandingOrder, number: &str) -> Order {
        self.db.generate_order(so, self.order_cycle.id, number).await.expect("Error generating order")
    }

    /// An order that is not linked to any standing order.
    pub async fn one_off_order(&self, number: &str, variant: &Variant, quantity: i64) -> Order {
        let order = NewOrder::new(number, self.shop, self.order_cycle.id);
        let order = self.db.create_order(order).await.expect("Error creating order");
        self.db.add_line_item(order.id, variant, quantity).await.expect("Error adding line item");
        order
    }
}
