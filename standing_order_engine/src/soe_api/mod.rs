//! # Standing order engine public API
//!
//! The `soe_api` module exposes the programmatic API of the standing order engine. Like the backend traits it sits on,
//! the API is modular; each part only asks for the backend capabilities it needs.
//!
//! * [`placement_api`] is the placement job itself. It selects the standing order orders of an order cycle and places
//!   each one.
//! * [`quantity_capper`] caps line items to the stock on hand.
//! * [`checkout_api`] takes a draft order through checkout to `complete`.
//! * [`notification_api`] records and publishes the placement emails.
//! * [`standing_line_item_api`] validates standing line items and propagates quantity changes into pending orders.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits required by the API,
//! plus the event producers that should hear about what it does.
//!
//! ```rust,ignore
//! use standing_order_engine::{events::EventProducers, PlacementApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/standing_orders.db", 5).await?;
//! let api = PlacementApi::new(db, EventProducers::default());
//! let summary = api.place_orders_for_cycle(order_cycle_id).await?;
//! println!("{summary}");
//! ```
pub mod checkout_api;
pub mod errors;
pub mod notification_api;
pub mod order_objects;
pub mod placement_api;
pub mod quantity_capper;
pub mod standing_line_item_api;
