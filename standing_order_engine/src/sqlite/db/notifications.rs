use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewNotification, Notification, NotificationId, NotificationKind, OrderId},
    traits::OutboxError,
};

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: NotificationId,
    order_id: OrderId,
    kind: NotificationKind,
    changes: String,
    message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = OutboxError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let changes = serde_json::from_str(&row.changes)?;
        Ok(Notification {
            id: row.id,
            order_id: row.order_id,
            kind: row.kind,
            changes,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, OutboxError> {
    let changes = serde_json::to_string(&notification.changes)?;
    let row: NotificationRow = sqlx::query_as(
        r#"
            INSERT INTO notifications (order_id, kind, changes, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(notification.order_id)
    .bind(notification.kind)
    .bind(changes)
    .bind(notification.message)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    row.try_into()
}

pub async fn fetch_notifications_for_order(
    order: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, OutboxError> {
    let rows: Vec<NotificationRow> = sqlx::query_as("SELECT * FROM notifications WHERE order_id = $1 ORDER BY id ASC")
        .bind(order)
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(Notification::try_from).collect()
}
