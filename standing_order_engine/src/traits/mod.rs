//! #  Backend contracts for the standing order engine.
//!
//! This module defines the interface contracts that storage backends need to expose in order to be used by the
//! placement API. The engine never talks to a database directly; it only talks to these traits.
//!
//! ## Traits
//!
//! * [`OrderManagement`] reads and writes orders and line items, and carries out the atomic checkout completion.
//! * [`InventoryOracle`] reports stock levels per variant and whether backorders are globally allowed.
//! * [`CatalogManagement`] answers questions about variants, order cycles, and the shipping and payment methods a shop
//!   offers. This includes the availability predicate used to validate standing line items.
//! * [`StandingOrderManagement`] reads subscriptions and their line items, and propagates quantity changes into the
//!   orders generated from them.
//! * [`NotificationOutbox`] stores the outbound notification records produced by the placement job.
//!
//! [`SqliteDatabase`](crate::SqliteDatabase) implements all of them.
mod catalog_management;
mod data_objects;
mod inventory_oracle;
mod notification_outbox;
mod order_management;
mod standing_order_management;

pub use catalog_management::{CatalogError, CatalogManagement};
pub use data_objects::{CheckoutCompletion, PaymentAttachment};
pub use inventory_oracle::{InventoryError, InventoryOracle};
pub use notification_outbox::{NotificationOutbox, OutboxError};
pub use order_management::{OrderManagement, OrderManagementError};
pub use standing_order_management::{StandingOrderError, StandingOrderManagement};
