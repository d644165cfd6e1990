use thiserror::Error;

use crate::db_types::{NewNotification, Notification, OrderId};

#[derive(Debug, Clone, Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Could not serialize the notification payload: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for OutboxError {
    fn from(e: sqlx::Error) -> Self {
        OutboxError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for OutboxError {
    fn from(e: serde_json::Error) -> Self {
        OutboxError::SerializationError(e.to_string())
    }
}

/// Storage for outbound notification records. Mail delivery picks records up from here.
#[allow(async_fn_in_trait)]
pub trait NotificationOutbox {
    async fn record_notification(&self, notification: NewNotification) -> Result<Notification, OutboxError>;

    async fn fetch_notifications_for_order(&self, order: OrderId) -> Result<Vec<Notification>, OutboxError>;
}
