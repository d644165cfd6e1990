use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{LineItem, LineItemId, Money, OrderId, VariantId};

pub async fn insert_line_item(
    order: OrderId,
    variant: VariantId,
    quantity: i64,
    price: Money,
    conn: &mut SqliteConnection,
) -> Result<LineItem, sqlx::Error> {
    let item = sqlx::query_as(
        "INSERT INTO line_items (order_id, variant_id, quantity, price) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(order)
    .bind(variant)
    .bind(quantity)
    .bind(price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_line_item(id: LineItemId, conn: &mut SqliteConnection) -> Result<Option<LineItem>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM line_items WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(item)
}

pub async fn fetch_line_items_for_order(
    order: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM line_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Sets the quantity for the line item. Returns `false` if the line item does not exist, or belongs to an order that
/// has already been completed.
pub async fn update_quantity(id: LineItemId, quantity: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE line_items SET quantity = $1
            WHERE id = $2 AND order_id IN (SELECT id FROM orders WHERE completed_at IS NULL);
        "#,
    )
    .bind(quantity)
    .bind(id)
    .execute(conn)
    .await?;
    trace!("📝️ Line item {id} quantity set to {quantity}. {} rows affected", result.rows_affected());
    Ok(result.rows_affected() > 0)
}
