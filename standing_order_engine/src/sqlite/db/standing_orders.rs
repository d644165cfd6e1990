use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{
    NewStandingOrder,
    OrderId,
    StandingLineItem,
    StandingLineItemId,
    StandingOrder,
    StandingOrderId,
    VariantId,
};

pub async fn insert_standing_order(
    so: NewStandingOrder,
    conn: &mut SqliteConnection,
) -> Result<StandingOrder, sqlx::Error> {
    let so = sqlx::query_as(
        r#"
            INSERT INTO standing_orders (
                shop_id,
                customer_id,
                schedule_id,
                shipping_method_id,
                payment_method_id,
                bill_address_id,
                ship_address_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(so.shop_id)
    .bind(so.customer_id)
    .bind(so.schedule_id)
    .bind(so.shipping_method_id)
    .bind(so.payment_method_id)
    .bind(so.bill_address_id)
    .bind(so.ship_address_id)
    .fetch_one(conn)
    .await?;
    Ok(so)
}

pub async fn fetch_standing_order(
    id: StandingOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<StandingOrder>, sqlx::Error> {
    let so = sqlx::query_as("SELECT * FROM standing_orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(so)
}

pub async fn fetch_standing_order_for_order(
    order: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<StandingOrder>, sqlx::Error> {
    let so = sqlx::query_as(
        r#"
            SELECT so.* FROM standing_orders so
            JOIN standing_order_orders soo ON soo.standing_order_id = so.id
            WHERE soo.order_id = $1;
        "#,
    )
    .bind(order)
    .fetch_optional(conn)
    .await?;
    Ok(so)
}

pub async fn insert_standing_line_item(
    standing_order: StandingOrderId,
    variant: VariantId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<StandingLineItem, sqlx::Error> {
    let item = sqlx::query_as(
        "INSERT INTO standing_line_items (standing_order_id, variant_id, quantity) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(standing_order)
    .bind(variant)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_standing_line_item(
    id: StandingLineItemId,
    conn: &mut SqliteConnection,
) -> Result<Option<StandingLineItem>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM standing_line_items WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(item)
}

pub async fn fetch_standing_line_items(
    standing_order: StandingOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StandingLineItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM standing_line_items WHERE standing_order_id = $1 ORDER BY id ASC")
        .bind(standing_order)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn update_standing_line_item_quantity(
    id: StandingLineItemId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<StandingLineItem>, sqlx::Error> {
    let item = sqlx::query_as("UPDATE standing_line_items SET quantity = $1 WHERE id = $2 RETURNING *")
        .bind(quantity)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

pub async fn link_order(
    standing_order: StandingOrderId,
    order: OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO standing_order_orders (standing_order_id, order_id) VALUES ($1, $2)")
        .bind(standing_order)
        .bind(order)
        .execute(conn)
        .await?;
    debug!("📝️ Order {order} linked to standing order {standing_order}");
    Ok(())
}

/// Copies the standing line item's quantity onto the matching line items of incomplete orders generated from the
/// standing order. Orders in order cycles that closed before `now` are left alone.
pub async fn update_pending_line_items(
    item: &StandingLineItem,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE line_items SET quantity = $1
            WHERE variant_id = $2
              AND order_id IN (
                SELECT o.id FROM orders o
                JOIN standing_order_orders soo ON soo.order_id = o.id
                LEFT JOIN order_cycles oc ON oc.id = o.order_cycle_id
                WHERE soo.standing_order_id = $3
                  AND o.completed_at IS NULL
                  AND (oc.orders_close_at IS NULL OR oc.orders_close_at > $4)
              );
        "#,
    )
    .bind(item.quantity)
    .bind(item.variant_id)
    .bind(item.standing_order_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
