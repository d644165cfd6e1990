use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use futures_util::future::join_all;
use log::*;
use tokio::task::JoinHandle;

use crate::events::{
    EventHandlers,
    EventHooks,
    EventProducers,
    OrderConfirmationEvent,
    PlacementEmailEvent,
    PlacementFailedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Records every event the engine publishes, so tests can count emails after the handlers have drained.
#[derive(Default, Clone)]
pub struct EventRecorder {
    placement_emails: Arc<Mutex<Vec<PlacementEmailEvent>>>,
    failures: Arc<Mutex<Vec<PlacementFailedEvent>>>,
    confirmations: Arc<Mutex<Vec<OrderConfirmationEvent>>>,
}

impl EventRecorder {
    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let emails = self.placement_emails.clone();
        hooks.on_placement_email(move |ev| {
            info!("🪝️ Placement email for order {}", ev.order.id);
            emails.lock().expect("poisoned").push(ev);
            Box::pin(async {}) as HookFuture
        });
        let failures = self.failures.clone();
        hooks.on_placement_failed(move |ev| {
            info!("🪝️ Failure email for order {}", ev.order.id);
            failures.lock().expect("poisoned").push(ev);
            Box::pin(async {}) as HookFuture
        });
        let confirmations = self.confirmations.clone();
        hooks.on_order_confirmation(move |ev| {
            info!("🪝️ Confirmation email for order {}", ev.order_id);
            confirmations.lock().expect("poisoned").push(ev);
            Box::pin(async {}) as HookFuture
        });
        hooks
    }

    /// Starts the handlers and returns the producers to hand to the API, plus the handler tasks. Drop every API holding
    /// the producers, then await the tasks, before reading the recorded events.
    pub fn start(&self, buffer_size: usize) -> (EventProducers, Vec<JoinHandle<()>>) {
        let handlers = EventHandlers::new(buffer_size, self.hooks());
        let producers = handlers.producers();
        let tasks = handlers.start_handlers();
        (producers, tasks)
    }

    pub fn placement_emails(&self) -> Vec<PlacementEmailEvent> {
        self.placement_emails.lock().expect("poisoned").clone()
    }

    pub fn failures(&self) -> Vec<PlacementFailedEvent> {
        self.failures.lock().expect("poisoned").clone()
    }

    pub fn confirmations(&self) -> Vec<OrderConfirmationEvent> {
        self.confirmations.lock().expect("poisoned").clone()
    }
}

/// Waits for every handler task to finish its queue.
pub async fn drain(tasks: Vec<JoinHandle<()>>) {
    for result in join_all(tasks).await {
        result.expect("Event handler panicked");
    }
}
