use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{ChangesMap, OrderCycleId, OrderId, OrderState, ShopId, StandingOrderId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub order_cycle_id: Option<OrderCycleId>,
    pub shop_id: Option<ShopId>,
    pub standing_order_id: Option<StandingOrderId>,
    /// `Some(true)` only matches orders generated from a standing order, `Some(false)` only ad-hoc orders.
    pub linked_to_standing_order: Option<bool>,
    /// `Some(true)` only matches orders without a completion timestamp, `Some(false)` only completed orders.
    pub incomplete: Option<bool>,
    pub states: Option<Vec<OrderState>>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_order_cycle(mut self, order_cycle_id: OrderCycleId) -> Self {
        self.order_cycle_id = Some(order_cycle_id);
        self
    }

    pub fn with_shop(mut self, shop_id: ShopId) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_standing_order(mut self, standing_order_id: StandingOrderId) -> Self {
        self.standing_order_id = Some(standing_order_id);
        self
    }

    pub fn linked_to_standing_order(mut self, linked: bool) -> Self {
        self.linked_to_standing_order = Some(linked);
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.incomplete = Some(true);
        self
    }

    pub fn completed(mut self) -> Self {
        self.incomplete = Some(false);
        self
    }

    pub fn with_state(mut self, state: OrderState) -> Self {
        let mut states = self.states.take().unwrap_or_default();
        states.push(state);
        self.states = Some(states);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.order_cycle_id.is_none() &&
            self.shop_id.is_none() &&
            self.standing_order_id.is_none() &&
            self.linked_to_standing_order.is_none() &&
            self.incomplete.is_none() &&
            self.states.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        writeln!(f, "Filters:")?;
        if let Some(id) = &self.order_id {
            writeln!(f, "order_id: {id}. ")?;
        }
        if let Some(id) = &self.order_cycle_id {
            writeln!(f, "order_cycle_id: {id}. ")?;
        }
        if let Some(id) = &self.shop_id {
            writeln!(f, "shop_id: {id}. ")?;
        }
        if let Some(id) = &self.standing_order_id {
            writeln!(f, "standing_order_id: {id}. ")?;
        }
        if let Some(linked) = self.linked_to_standing_order {
            writeln!(f, "linked_to_standing_order: {linked}. ")?;
        }
        if let Some(incomplete) = self.incomplete {
            writeln!(f, "incomplete: {incomplete}. ")?;
        }
        if let Some(states) = &self.states {
            let states = states.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            writeln!(f, "states: {states}. ")?;
        }
        Ok(())
    }
}

/// An order that the placement job completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub number: String,
    pub changes: ChangesMap,
    /// `false` if the order was placed, but the placement email could not be dispatched.
    pub notified: bool,
}

/// An order that the placement job could not complete, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOrder {
    pub order_id: OrderId,
    pub number: String,
    pub reason: String,
}

/// The result of one run of the placement job for an order cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementSummary {
    pub order_cycle_id: Option<OrderCycleId>,
    pub placed: Vec<PlacedOrder>,
    pub skipped: Vec<SkippedOrder>,
}

impl PlacementSummary {
    pub fn new(order_cycle_id: OrderCycleId) -> Self {
        Self { order_cycle_id: Some(order_cycle_id), ..Default::default() }
    }

    pub fn processed_count(&self) -> usize {
        self.placed.len() + self.skipped.len()
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Placed orders that had at least one line item capped.
    pub fn capped_count(&self) -> usize {
        self.placed.iter().filter(|p| !p.changes.is_empty()).count()
    }

    /// Placed orders whose placement email could not be dispatched.
    pub fn unnotified_count(&self) -> usize {
        self.placed.iter().filter(|p| !p.notified).count()
    }

    pub fn is_placed(&self, order_id: OrderId) -> bool {
        self.placed.iter().any(|p| p.order_id == order_id)
    }

    pub fn is_skipped(&self, order_id: OrderId) -> bool {
        self.skipped.iter().any(|s| s.order_id == order_id)
    }
}

impl Display for PlacementSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cycle = self.order_cycle_id.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        write!(
            f,
            "Order cycle {cycle}: {} processed, {} placed ({} capped, {} not notified), {} skipped",
            self.processed_count(),
            self.placed_count(),
            self.capped_count(),
            self.unnotified_count(),
            self.skipped_count()
        )
    }
}
