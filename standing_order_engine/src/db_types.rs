use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use market_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------      Identifiers      ---------------------------------------------------------
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }

        impl $name {
            pub fn value(&self) -> i64 {
                self.0
            }
        }
    };
}

id_type!(ShopId);
id_type!(CustomerId);
id_type!(OrderCycleId);
id_type!(ScheduleId);
id_type!(ExchangeId);
id_type!(VariantId);
id_type!(StandingOrderId);
id_type!(StandingLineItemId);
id_type!(OrderId);
id_type!(LineItemId);
id_type!(AddressId);
id_type!(ShippingMethodId);
id_type!(PaymentMethodId);
id_type!(PaymentId);
id_type!(NotificationId);

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------      OrderCycle       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OrderCycle {
    pub id: OrderCycleId,
    pub name: String,
    pub coordinator_id: ShopId,
    pub orders_open_at: Option<DateTime<Utc>>,
    pub orders_close_at: Option<DateTime<Utc>>,
}

impl OrderCycle {
    /// An order cycle is open once `orders_open_at` has passed, and until `orders_close_at` (if set) is reached.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let opened = self.orders_open_at.map(|t| t <= now).unwrap_or(false);
        let closed = self.orders_close_at.map(|t| t <= now).unwrap_or(false);
        opened && !closed
    }
}

#[derive(Debug, Clone)]
pub struct NewOrderCycle {
    pub name: String,
    pub coordinator_id: ShopId,
    pub orders_open_at: Option<DateTime<Utc>>,
    pub orders_close_at: Option<DateTime<Utc>>,
}

impl NewOrderCycle {
    pub fn new<S: Into<String>>(name: S, coordinator_id: ShopId) -> Self {
        Self { name: name.into(), coordinator_id, orders_open_at: None, orders_close_at: None }
    }

    pub fn opening_at(mut self, opens: DateTime<Utc>, closes: Option<DateTime<Utc>>) -> Self {
        self.orders_open_at = Some(opens);
        self.orders_close_at = closes;
        self
    }
}

//--------------------------------------       Variant         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    pub price: Money,
    pub count_on_hand: i64,
    pub on_demand: bool,
}

impl Variant {
    pub fn stock_level(&self) -> StockLevel {
        if self.on_demand {
            StockLevel::OnDemand
        } else {
            StockLevel::Limited(self.count_on_hand)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub name: String,
    pub price: Money,
    pub count_on_hand: i64,
    pub on_demand: bool,
}

impl NewVariant {
    pub fn new<S: Into<String>>(name: S, price: Money, count_on_hand: i64) -> Self {
        Self { name: name.into(), price, count_on_hand, on_demand: false }
    }

    pub fn on_demand(mut self) -> Self {
        self.on_demand = true;
        self
    }
}

/// The stock available for a variant, as reported by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    /// Only this many units can be sold. Can be negative if the variant has been oversold.
    Limited(i64),
    /// The producer can always supply more.
    OnDemand,
}

impl StockLevel {
    /// Returns the capped quantity if `requested` cannot be fulfilled from this stock level.
    pub fn cap(&self, requested: i64) -> Option<i64> {
        match self {
            StockLevel::OnDemand => None,
            StockLevel::Limited(on_hand) if requested > *on_hand => Some((*on_hand).max(0)),
            StockLevel::Limited(_) => None,
        }
    }
}

//--------------------------------------       Address         ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub id: AddressId,
    pub firstname: String,
    pub lastname: String,
    pub address1: String,
    pub city: String,
    pub zipcode: String,
    pub phone: String,
}

impl Default for AddressId {
    fn default() -> Self {
        Self(0)
    }
}

impl Address {
    /// The names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("firstname", &self.firstname),
            ("address1", &self.address1),
            ("city", &self.city),
            ("zipcode", &self.zipcode),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

//--------------------------------------  Shipping / Payment   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub shop_id: ShopId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub shop_id: ShopId,
    pub name: String,
}

//--------------------------------------    StandingOrder      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StandingOrder {
    pub id: StandingOrderId,
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub schedule_id: ScheduleId,
    pub shipping_method_id: Option<ShippingMethodId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub bill_address_id: Option<AddressId>,
    pub ship_address_id: Option<AddressId>,
}

#[derive(Debug, Clone)]
pub struct NewStandingOrder {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub schedule_id: ScheduleId,
    pub shipping_method_id: Option<ShippingMethodId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub bill_address_id: Option<AddressId>,
    pub ship_address_id: Option<AddressId>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StandingLineItem {
    pub id: StandingLineItemId,
    pub standing_order_id: StandingOrderId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

//--------------------------------------      OrderState       ---------------------------------------------------------
/// The checkout workflow states. Every state other than `Complete` is an incomplete (draft) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Cart,
    Address,
    Delivery,
    Payment,
    Complete,
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Cart => "cart",
            OrderState::Address => "address",
            OrderState::Delivery => "delivery",
            OrderState::Payment => "payment",
            OrderState::Complete => "complete",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Self::Cart),
            "address" => Ok(Self::Address),
            "delivery" => Ok(Self::Delivery),
            "payment" => Ok(Self::Payment),
            "complete" => Ok(Self::Complete),
            s => Err(ConversionError::new("order state", s)),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub number: String,
    pub shop_id: ShopId,
    pub customer_id: Option<CustomerId>,
    pub order_cycle_id: Option<OrderCycleId>,
    pub state: OrderState,
    pub bill_address_id: Option<AddressId>,
    pub ship_address_id: Option<AddressId>,
    pub shipping_method_id: Option<ShippingMethodId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub item_total: Money,
    pub total: Money,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: String,
    pub shop_id: ShopId,
    pub customer_id: Option<CustomerId>,
    pub order_cycle_id: Option<OrderCycleId>,
    pub bill_address_id: Option<AddressId>,
    pub ship_address_id: Option<AddressId>,
    pub shipping_method_id: Option<ShippingMethodId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(number: S, shop_id: ShopId, order_cycle_id: OrderCycleId) -> Self {
        Self {
            number: number.into(),
            shop_id,
            customer_id: None,
            order_cycle_id: Some(order_cycle_id),
            bill_address_id: None,
            ship_address_id: None,
            shipping_method_id: None,
            payment_method_id: None,
            completed_at: None,
        }
    }

    /// Copies the customer, addresses, shipping and payment methods from the standing order, as the order
    /// generator does for each occurrence.
    pub fn for_standing_order(mut self, standing_order: &StandingOrder) -> Self {
        self.customer_id = Some(standing_order.customer_id);
        self.bill_address_id = standing_order.bill_address_id;
        self.ship_address_id = standing_order.ship_address_id;
        self.shipping_method_id = standing_order.shipping_method_id;
        self.payment_method_id = standing_order.payment_method_id;
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

//--------------------------------------       LineItem        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub price: Money,
}

impl LineItem {
    pub fn amount(&self) -> Money {
        self.price * self.quantity
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// The payment method has been attached during checkout, but nothing has been charged.
    Checkout,
    Processing,
    Pending,
    Completed,
    Failed,
    Void,
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentState::Checkout => "checkout",
            PaymentState::Processing => "processing",
            PaymentState::Pending => "pending",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Void => "void",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_method_id: PaymentMethodId,
    pub amount: Money,
    pub state: PaymentState,
}

//--------------------------------------     ChangesMap        ---------------------------------------------------------
/// The quantities that line items had before they were capped to the available stock, keyed by line item.
///
/// Only line items that were actually changed appear in the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesMap(BTreeMap<LineItemId, i64>);

impl ChangesMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line_item: LineItemId, original_quantity: i64) {
        self.0.insert(line_item, original_quantity);
    }

    /// The quantity the line item had before capping, if it was capped.
    pub fn get(&self, line_item: &LineItemId) -> Option<i64> {
        self.0.get(line_item).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LineItemId, &i64)> {
        self.0.iter()
    }

    pub fn to_changes(&self) -> Vec<QuantityChange> {
        self.0
            .iter()
            .map(|(id, qty)| QuantityChange { line_item_id: *id, original_quantity: *qty })
            .collect()
    }
}

impl FromIterator<(LineItemId, i64)> for ChangesMap {
    fn from_iter<T: IntoIterator<Item = (LineItemId, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub line_item_id: LineItemId,
    pub original_quantity: i64,
}

//--------------------------------------     Notification      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The order was placed exactly as subscribed.
    Placement,
    /// The order was placed, but some quantities were reduced to the available stock.
    Capped,
    /// The order could not be placed.
    Failure,
}

impl NotificationKind {
    pub fn for_changes(changes: &ChangesMap) -> Self {
        if changes.is_empty() {
            NotificationKind::Placement
        } else {
            NotificationKind::Capped
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::Placement => "placement",
            NotificationKind::Capped => "capped",
            NotificationKind::Failure => "failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub order_id: OrderId,
    pub kind: NotificationKind,
    pub changes: Vec<QuantityChange>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub order_id: OrderId,
    pub kind: NotificationKind,
    pub changes: Vec<QuantityChange>,
    pub message: Option<String>,
}

impl NewNotification {
    pub fn placement(order_id: OrderId, changes: &ChangesMap) -> Self {
        Self { order_id, kind: NotificationKind::for_changes(changes), changes: changes.to_changes(), message: None }
    }

    pub fn failure<S: Into<String>>(order_id: OrderId, reason: S) -> Self {
        Self { order_id, kind: NotificationKind::Failure, changes: Vec::new(), message: Some(reason.into()) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stock_level_caps() {
        assert_eq!(StockLevel::Limited(5).cap(3), None);
        assert_eq!(StockLevel::Limited(3).cap(3), None);
        assert_eq!(StockLevel::Limited(2).cap(3), Some(2));
        assert_eq!(StockLevel::Limited(0).cap(3), Some(0));
        assert_eq!(StockLevel::Limited(-4).cap(3), Some(0));
        assert_eq!(StockLevel::OnDemand.cap(1_000), None);
    }

    #[test]
    fn order_state_strings() {
        assert_eq!(OrderState::Payment.to_string(), "payment");
        assert_eq!("delivery".parse::<OrderState>().unwrap(), OrderState::Delivery);
        assert!("shipped".parse::<OrderState>().is_err());
    }

    #[test]
    fn address_validation() {
        let mut address = Address {
            firstname: "Mary".into(),
            address1: "1 Farm Rd".into(),
            city: "Ballarat".into(),
            zipcode: "3350".into(),
            ..Default::default()
        };
        assert!(address.missing_fields().is_empty());
        address.city = "  ".into();
        address.zipcode = String::new();
        assert_eq!(address.missing_fields(), vec!["city", "zipcode"]);
    }

    #[test]
    fn notification_kind_follows_changes() {
        let mut changes = ChangesMap::new();
        assert_eq!(NotificationKind::for_changes(&changes), NotificationKind::Placement);
        changes.record(LineItemId(7), 3);
        assert_eq!(NotificationKind::for_changes(&changes), NotificationKind::Capped);
        let n = NewNotification::placement(OrderId(1), &changes);
        assert_eq!(n.changes, vec![QuantityChange { line_item_id: LineItemId(7), original_quantity: 3 }]);
    }

    #[test]
    fn order_cycle_open_window() {
        let now = Utc::now();
        let hour = chrono::Duration::hours(1);
        let mut oc = OrderCycle {
            id: OrderCycleId(1),
            name: "Week 1".into(),
            coordinator_id: ShopId(1),
            orders_open_at: Some(now - hour),
            orders_close_at: Some(now + hour),
        };
        assert!(oc.is_open_at(now));
        oc.orders_close_at = Some(now - hour);
        assert!(!oc.is_open_at(now));
        oc.orders_open_at = None;
        oc.orders_close_at = None;
        assert!(!oc.is_open_at(now));
    }
}
