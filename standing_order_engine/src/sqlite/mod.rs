//! SQLite database module for the standing order engine.
//!
//! [`SqliteDatabase`] implements every backend trait in [`crate::traits`]. The schema lives in `migrations/` and is
//! embedded into the binary; call [`SqliteDatabase::migrate`] before first use.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
