use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use standing_order_engine::{
    db_types::OrderCycleId,
    events::EventProducers,
    order_objects::PlacementSummary,
    OrderManagement,
    PlacementApi,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::errors::WorkerError;

/// Runs the placement job once for `order_cycle`.
pub async fn place_order_cycle(
    db: SqliteDatabase,
    producers: EventProducers,
    order_cycle: OrderCycleId,
) -> Result<PlacementSummary, WorkerError> {
    let api = PlacementApi::new(db, producers);
    let summary = api.place_orders_for_cycle(order_cycle).await?;
    Ok(summary)
}

/// Runs the placement job for every order cycle that is open at `now` and still has standing order orders waiting to
/// be placed. A cycle whose orders cannot be selected is logged and left for the next run.
pub async fn place_pending_cycles(
    api: &PlacementApi<SqliteDatabase>,
    db: &SqliteDatabase,
    now: DateTime<Utc>,
) -> Result<Vec<PlacementSummary>, WorkerError> {
    let cycles = db
        .fetch_order_cycles_awaiting_placement(now)
        .await
        .map_err(|e| WorkerError::CycleLookupFailed(e.to_string()))?;
    debug!("🕰️ {} order cycles have standing orders awaiting placement", cycles.len());
    let mut summaries = Vec::with_capacity(cycles.len());
    for cycle in cycles {
        match api.place_orders_for_cycle(cycle.id).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => error!("🕰️ Could not place the standing orders for order cycle {} [{}]. {e}", cycle.id, cycle.name),
        }
    }
    Ok(summaries)
}

/// Starts the placement worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_placement_worker(db: SqliteDatabase, producers: EventProducers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = PlacementApi::new(db.clone(), producers);
        info!("🕰️ Standing order placement worker started. Polling every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Looking for order cycles to place");
            match place_pending_cycles(&api, &db, Utc::now()).await {
                Ok(summaries) if summaries.is_empty() => trace!("🕰️ Nothing to place"),
                Ok(summaries) => {
                    let placed = summaries.iter().map(|s| s.placed_count()).sum::<usize>();
                    let skipped = summaries.iter().map(|s| s.skipped_count()).sum::<usize>();
                    info!("🕰️ {} order cycles processed. {placed} orders placed, {skipped} skipped", summaries.len());
                },
                Err(e) => {
                    error!("🕰️ Error running the standing order placement job: {e}");
                },
            }
        }
    })
}
