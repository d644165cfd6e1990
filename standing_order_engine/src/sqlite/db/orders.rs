use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        Address,
        AddressId,
        Money,
        NewOrder,
        Order,
        OrderCycle,
        OrderId,
        OrderState,
        Payment,
        PaymentState,
    },
    order_objects::OrderQueryFilter,
    traits::{CheckoutCompletion, OrderManagementError},
};

/// Inserts a new draft order into the database using the given connection. This is not atomic. You can embed this
/// call inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let state = if order.completed_at.is_some() { OrderState::Complete } else { OrderState::Cart };
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                number,
                shop_id,
                customer_id,
                order_cycle_id,
                state,
                bill_address_id,
                ship_address_id,
                shipping_method_id,
                payment_method_id,
                completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order.number)
    .bind(order.shop_id)
    .bind(order.customer_id)
    .bind(order.order_cycle_id)
    .bind(state)
    .bind(order.bill_address_id)
    .bind(order.ship_address_id)
    .bind(order.shipping_method_id)
    .bind(order.payment_method_id)
    .bind(order.completed_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.number, order.id);
    Ok(order)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `id` in ascending order
pub async fn fetch_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT orders.* FROM orders");
    if !query.is_empty() {
        builder.push(" WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(id) = query.order_id {
        where_clause.push("orders.id = ");
        where_clause.push_bind_unseparated(id);
    }
    if let Some(cycle) = query.order_cycle_id {
        where_clause.push("orders.order_cycle_id = ");
        where_clause.push_bind_unseparated(cycle);
    }
    if let Some(shop) = query.shop_id {
        where_clause.push("orders.shop_id = ");
        where_clause.push_bind_unseparated(shop);
    }
    if let Some(so) = query.standing_order_id {
        where_clause.push("orders.id IN (SELECT order_id FROM standing_order_orders WHERE standing_order_id = ");
        where_clause.push_bind_unseparated(so);
        where_clause.push_unseparated(")");
    }
    match query.linked_to_standing_order {
        Some(true) => {
            where_clause.push("orders.id IN (SELECT order_id FROM standing_order_orders)");
        },
        Some(false) => {
            where_clause.push("orders.id NOT IN (SELECT order_id FROM standing_order_orders)");
        },
        None => {},
    }
    match query.incomplete {
        Some(true) => {
            where_clause.push("orders.completed_at IS NULL");
        },
        Some(false) => {
            where_clause.push("orders.completed_at IS NOT NULL");
        },
        None => {},
    }
    if let Some(states) = query.states.filter(|s| !s.is_empty()) {
        let states = states.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("orders.state IN ({states})"));
    }
    builder.push(" ORDER BY orders.id ASC");
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of fetch_orders: {:?}", orders.len());
    Ok(orders)
}

/// Sums the line items of the order and stores the result in `item_total` and `total`. Completed orders are left
/// alone and yield `None`.
pub async fn update_totals(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let item_total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(price * quantity), 0) FROM line_items WHERE order_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
    let item_total = Money::from(item_total);
    trace!("📝️ Order {id} item total is {item_total}");
    let order = sqlx::query_as("UPDATE orders SET item_total = $1, total = $2 WHERE id = $3 AND completed_at IS NULL RETURNING *")
        .bind(item_total)
        .bind(item_total)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Marks the order as complete and attaches its payment. Run this inside a transaction.
///
/// The order is only updated if it has not been completed yet.
pub async fn complete_checkout(
    completion: CheckoutCompletion,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderManagementError> {
    let id = completion.order_id;
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                state = $1,
                completed_at = $2,
                shipping_method_id = $3,
                payment_method_id = $4,
                item_total = $5,
                total = $6
            WHERE id = $7 AND completed_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(OrderState::Complete)
    .bind(completion.completed_at)
    .bind(completion.shipping_method_id)
    .bind(completion.payment.payment_method_id)
    .bind(completion.item_total)
    .bind(completion.total)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let order = match order {
        Some(o) => o,
        None => {
            return match fetch_order(id, conn).await? {
                Some(_) => Err(OrderManagementError::AlreadyCompleted(id)),
                None => Err(OrderManagementError::OrderNotFound(id)),
            };
        },
    };
    attach_checkout_payment(&order, completion, conn).await?;
    Ok(order)
}

/// Attaches a payment in the `checkout` state. An existing `checkout` payment for the order is reused rather than
/// creating a second one.
async fn attach_checkout_payment(
    order: &Order,
    completion: CheckoutCompletion,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let existing: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND state = $2 ORDER BY id ASC LIMIT 1")
            .bind(order.id)
            .bind(PaymentState::Checkout)
            .fetch_optional(&mut *conn)
            .await?;
    let payment = completion.payment;
    match existing {
        Some(p) => {
            sqlx::query("UPDATE payments SET payment_method_id = $1, amount = $2 WHERE id = $3")
                .bind(payment.payment_method_id)
                .bind(payment.amount)
                .bind(p.id)
                .execute(conn)
                .await?;
            trace!("📝️ Payment {} for order {} updated to {}", p.id, order.id, payment.amount);
        },
        None => {
            sqlx::query("INSERT INTO payments (order_id, payment_method_id, amount, state) VALUES ($1, $2, $3, $4)")
                .bind(order.id)
                .bind(payment.payment_method_id)
                .bind(payment.amount)
                .bind(PaymentState::Checkout)
                .execute(conn)
                .await?;
            trace!("📝️ Checkout payment of {} attached to order {}", payment.amount, order.id);
        },
    }
    Ok(())
}

pub async fn fetch_payments(order: OrderId, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let payments =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id ASC").bind(order).fetch_all(conn).await?;
    Ok(payments)
}

pub async fn insert_address(address: Address, conn: &mut SqliteConnection) -> Result<Address, sqlx::Error> {
    let address = sqlx::query_as(
        r#"
            INSERT INTO addresses (firstname, lastname, address1, city, zipcode, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(address.firstname)
    .bind(address.lastname)
    .bind(address.address1)
    .bind(address.city)
    .bind(address.zipcode)
    .bind(address.phone)
    .fetch_one(conn)
    .await?;
    Ok(address)
}

pub async fn fetch_address(id: AddressId, conn: &mut SqliteConnection) -> Result<Option<Address>, sqlx::Error> {
    let address = sqlx::query_as("SELECT * FROM addresses WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(address)
}

/// Order cycles that have opened by `now`, have not closed, and still have incomplete orders generated from a
/// standing order.
pub async fn fetch_order_cycles_awaiting_placement(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderCycle>, sqlx::Error> {
    let cycles = sqlx::query_as(
        r#"
            SELECT oc.* FROM order_cycles oc
            WHERE oc.orders_open_at IS NOT NULL
              AND oc.orders_open_at <= $1
              AND (oc.orders_close_at IS NULL OR oc.orders_close_at > $2)
              AND EXISTS (
                SELECT 1 FROM orders o
                JOIN standing_order_orders soo ON soo.order_id = o.id
                WHERE o.order_cycle_id = oc.id AND o.completed_at IS NULL
              )
            ORDER BY oc.id ASC;
        "#,
    )
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(cycles)
}
