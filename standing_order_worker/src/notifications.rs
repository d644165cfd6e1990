//! Mail delivery hooks for the placement job.
//!
//! The engine has already written an outbox record for every email by the time these hooks fire. The hooks hand the
//! message over for delivery; for now that means writing it to the mail log.
use std::{future::Future, pin::Pin};

use log::*;
use standing_order_engine::events::{
    EventHandlers,
    EventHooks,
    OrderConfirmationEvent,
    PlacementEmailEvent,
    PlacementFailedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub fn create_mail_handlers(buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_placement_email(|ev| Box::pin(deliver_placement_email(ev)) as HookFuture);
    hooks.on_placement_failed(|ev| Box::pin(deliver_failure_email(ev)) as HookFuture);
    hooks.on_order_confirmation(|ev| Box::pin(deliver_confirmation(ev)) as HookFuture);
    EventHandlers::new(buffer_size, hooks)
}

async fn deliver_placement_email(ev: PlacementEmailEvent) {
    let changes = serde_json::to_string(&ev.quantity_changes()).unwrap_or_else(|e| format!("<unserializable: {e}>"));
    if ev.was_capped() {
        info!(
            "📧️ Mailing capped placement notice {} for order {} ({}). Original quantities: {changes}",
            ev.notification.id, ev.order.number, ev.order.id
        );
    } else {
        info!("📧️ Mailing placement notice {} for order {} ({})", ev.notification.id, ev.order.number, ev.order.id);
    }
}

async fn deliver_failure_email(ev: PlacementFailedEvent) {
    info!(
        "📧️ Mailing failure notice {} for order {} ({}). Reason: {}",
        ev.notification.id, ev.order.number, ev.order.id, ev.reason
    );
}

async fn deliver_confirmation(ev: OrderConfirmationEvent) {
    match serde_json::to_string(&ev) {
        Ok(json) => info!("📧️ Mailing order confirmation: {json}"),
        Err(e) => error!("📧️ Could not render the confirmation for order {}. {e}", ev.order_id),
    }
}
