//! Standing Order Engine
//!
//! Customers of the market can subscribe to a recurring order (a "standing order"). A draft order is generated ahead of
//! time for every occurrence of the subscription's schedule. When the sales window for an occurrence (an "order cycle")
//! opens, the placement job in this library turns those drafts into placed orders.
//!
//! The library is divided into three main sections:
//! 1. Backend contracts ([`mod@traits`]) and the SQLite backend that implements them ([`SqliteDatabase`]). You
//!    should never need to access the database directly. The exception is the data types used in the database. These
//!    are defined in the [`mod@db_types`] module and are public.
//! 2. The public API ([`PlacementApi`], [`CheckoutApi`], [`NotificationApi`], [`QuantityCapper`] and
//!    [`StandingLineItemApi`]). This is where the placement logic lives, and it only talks to the backend traits.
//! 3. Events ([`mod@events`]). The engine publishes an event whenever a placement email should be sent. A simple
//!    pub-sub framework is used so that you can easily hook into these events and deliver the mail however you like.
pub mod db_types;
pub mod events;
pub mod traits;

mod soe_api;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use soe_api::{
    checkout_api::{CheckoutApi, ConfirmationPolicy},
    errors::{CapError, CompletionError, NotificationError, PlacementError, SelectionError, StandingLineItemError},
    notification_api::NotificationApi,
    order_objects,
    placement_api::PlacementApi,
    quantity_capper::QuantityCapper,
    standing_line_item_api::StandingLineItemApi,
};
pub use traits::{
    CatalogManagement,
    InventoryOracle,
    NotificationOutbox,
    OrderManagement,
    StandingOrderManagement,
};
