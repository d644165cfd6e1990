use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{
    CustomerId,
    ExchangeId,
    NewOrderCycle,
    OrderCycle,
    OrderCycleId,
    PaymentMethod,
    ScheduleId,
    ShippingMethod,
    ShopId,
    VariantId,
};

pub async fn insert_shop(name: &str, conn: &mut SqliteConnection) -> Result<ShopId, sqlx::Error> {
    let id = sqlx::query_scalar("INSERT INTO shops (name) VALUES ($1) RETURNING id").bind(name).fetch_one(conn).await?;
    Ok(ShopId(id))
}

pub async fn insert_customer(email: &str, shop: ShopId, conn: &mut SqliteConnection) -> Result<CustomerId, sqlx::Error> {
    let id = sqlx::query_scalar("INSERT INTO customers (email, shop_id) VALUES ($1, $2) RETURNING id")
        .bind(email)
        .bind(shop)
        .fetch_one(conn)
        .await?;
    Ok(CustomerId(id))
}

pub async fn insert_order_cycle(cycle: NewOrderCycle, conn: &mut SqliteConnection) -> Result<OrderCycle, sqlx::Error> {
    let cycle = sqlx::query_as(
        r#"
            INSERT INTO order_cycles (name, coordinator_id, orders_open_at, orders_close_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(cycle.name)
    .bind(cycle.coordinator_id)
    .bind(cycle.orders_open_at)
    .bind(cycle.orders_close_at)
    .fetch_one(conn)
    .await?;
    Ok(cycle)
}

pub async fn fetch_order_cycle(id: OrderCycleId, conn: &mut SqliteConnection) -> Result<Option<OrderCycle>, sqlx::Error> {
    let cycle = sqlx::query_as("SELECT * FROM order_cycles WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(cycle)
}

/// Creates a schedule containing the given order cycles. Run this inside a transaction.
pub async fn insert_schedule(
    name: &str,
    order_cycles: &[OrderCycleId],
    conn: &mut SqliteConnection,
) -> Result<ScheduleId, sqlx::Error> {
    let id: i64 = sqlx::query_scalar("INSERT INTO schedules (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    for oc in order_cycles {
        sqlx::query("INSERT INTO schedule_order_cycles (schedule_id, order_cycle_id) VALUES ($1, $2)")
            .bind(id)
            .bind(oc)
            .execute(&mut *conn)
            .await?;
    }
    Ok(ScheduleId(id))
}

pub async fn schedule_contains(
    schedule: ScheduleId,
    order_cycle: OrderCycleId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM schedule_order_cycles WHERE schedule_id = $1 AND order_cycle_id = $2")
            .bind(schedule)
            .bind(order_cycle)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

/// Creates an exchange offering the given variants. Run this inside a transaction.
pub async fn insert_exchange(
    order_cycle: OrderCycleId,
    sender: ShopId,
    receiver: ShopId,
    incoming: bool,
    variants: &[VariantId],
    conn: &mut SqliteConnection,
) -> Result<ExchangeId, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO exchanges (order_cycle_id, sender_id, receiver_id, incoming) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(order_cycle)
    .bind(sender)
    .bind(receiver)
    .bind(incoming)
    .fetch_one(&mut *conn)
    .await?;
    for v in variants {
        sqlx::query("INSERT INTO exchange_variants (exchange_id, variant_id) VALUES ($1, $2)")
            .bind(id)
            .bind(v)
            .execute(&mut *conn)
            .await?;
    }
    Ok(ExchangeId(id))
}

/// `true` if an outgoing exchange, in one of the schedule's order cycles, offers the variant to the shop.
pub async fn variant_available_from(
    variant: VariantId,
    shop: ShopId,
    schedule: ScheduleId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM exchange_variants ev
            JOIN exchanges e ON e.id = ev.exchange_id
            JOIN schedule_order_cycles soc ON soc.order_cycle_id = e.order_cycle_id
            WHERE ev.variant_id = $1
              AND e.incoming = FALSE
              AND e.receiver_id = $2
              AND soc.schedule_id = $3;
        "#,
    )
    .bind(variant)
    .bind(shop)
    .bind(schedule)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Variant {variant} is offered to shop {shop} by {count} exchanges in schedule {schedule}");
    Ok(count > 0)
}

pub async fn insert_shipping_method(
    shop: ShopId,
    name: &str,
    conn: &mut SqliteConnection,
) -> Result<ShippingMethod, sqlx::Error> {
    let method = sqlx::query_as("INSERT INTO shipping_methods (shop_id, name) VALUES ($1, $2) RETURNING *")
        .bind(shop)
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(method)
}

pub async fn fetch_shipping_methods(shop: ShopId, conn: &mut SqliteConnection) -> Result<Vec<ShippingMethod>, sqlx::Error> {
    let methods = sqlx::query_as("SELECT * FROM shipping_methods WHERE shop_id = $1 ORDER BY id ASC")
        .bind(shop)
        .fetch_all(conn)
        .await?;
    Ok(methods)
}

pub async fn insert_payment_method(
    shop: ShopId,
    name: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentMethod, sqlx::Error> {
    let method = sqlx::query_as("INSERT INTO payment_methods (shop_id, name) VALUES ($1, $2) RETURNING *")
        .bind(shop)
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(method)
}

pub async fn fetch_payment_methods(shop: ShopId, conn: &mut SqliteConnection) -> Result<Vec<PaymentMethod>, sqlx::Error> {
    let methods = sqlx::query_as("SELECT * FROM payment_methods WHERE shop_id = $1 ORDER BY id ASC")
        .bind(shop)
        .fetch_all(conn)
        .await?;
    Ok(methods)
}
