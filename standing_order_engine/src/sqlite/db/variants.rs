use sqlx::SqliteConnection;

use crate::db_types::{NewVariant, Variant, VariantId};

pub async fn insert_variant(variant: NewVariant, conn: &mut SqliteConnection) -> Result<Variant, sqlx::Error> {
    let variant = sqlx::query_as(
        "INSERT INTO variants (name, price, count_on_hand, on_demand) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(variant.name)
    .bind(variant.price)
    .bind(variant.count_on_hand)
    .bind(variant.on_demand)
    .fetch_one(conn)
    .await?;
    Ok(variant)
}

pub async fn fetch_variant(id: VariantId, conn: &mut SqliteConnection) -> Result<Option<Variant>, sqlx::Error> {
    let variant = sqlx::query_as("SELECT * FROM variants WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(variant)
}

pub async fn set_count_on_hand(id: VariantId, count: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE variants SET count_on_hand = $1 WHERE id = $2").bind(count).bind(id).execute(conn).await?;
    Ok(())
}
