//! # Standing order worker
//! The process the scheduler runs to place standing orders. It can either:
//! * place the standing orders of a single order cycle and exit (`place --order-cycle <ID>`), or
//! * keep running and place the standing orders of every order cycle as it opens (`watch`).
//!
//! Placement emails are handed to the mail hooks in [`notifications`].
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod notifications;
pub mod placement_worker;

use log::*;
use standing_order_engine::SqliteDatabase;

use crate::{config::WorkerConfig, errors::WorkerError};

/// Connects to the configured database and brings its schema up to date.
pub async fn connect(config: &WorkerConfig) -> Result<SqliteDatabase, WorkerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| WorkerError::DatabaseError(e.to_string()))?
        .with_backorders(config.allow_backorders);
    db.migrate().await.map_err(|e| WorkerError::MigrationError(e.to_string()))?;
    info!("🕰️ Connected to {} (backorders allowed: {})", config.database_url, config.allow_backorders);
    Ok(db)
}
