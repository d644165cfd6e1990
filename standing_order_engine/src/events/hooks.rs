use std::{future::Future, pin::Pin, sync::Arc};

use tokio::task::JoinHandle;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderConfirmationEvent,
    PlacementEmailEvent,
    PlacementFailedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub placement_email_producer: Vec<EventProducer<PlacementEmailEvent>>,
    pub placement_failed_producer: Vec<EventProducer<PlacementFailedEvent>>,
    pub order_confirmation_producer: Vec<EventProducer<OrderConfirmationEvent>>,
}

impl EventProducers {
    pub async fn publish_placement_email(&self, event: PlacementEmailEvent) {
        for producer in &self.placement_email_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_placement_failed(&self, event: PlacementFailedEvent) {
        for producer in &self.placement_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_confirmation(&self, event: OrderConfirmationEvent) {
        for producer in &self.order_confirmation_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_placement_email: Option<EventHandler<PlacementEmailEvent>>,
    pub on_placement_failed: Option<EventHandler<PlacementFailedEvent>>,
    pub on_order_confirmation: Option<EventHandler<OrderConfirmationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_placement_email = hooks.on_placement_email.map(|f| EventHandler::new(buffer_size, f));
        let on_placement_failed = hooks.on_placement_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_confirmation = hooks.on_order_confirmation.map(|f| EventHandler::new(buffer_size, f));
        Self { on_placement_email, on_placement_failed, on_order_confirmation }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_placement_email {
            result.placement_email_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_placement_failed {
            result.placement_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_confirmation {
            result.order_confirmation_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns every registered handler. Each task ends once all its producers are dropped and its jobs are done, so
    /// awaiting the returned handles drains the outstanding events.
    pub fn start_handlers(self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(handler) = self.on_placement_email {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_placement_failed {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_order_confirmation {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        tasks
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_placement_email: Option<Handler<PlacementEmailEvent>>,
    pub on_placement_failed: Option<Handler<PlacementFailedEvent>>,
    pub on_order_confirmation: Option<Handler<OrderConfirmationEvent>>,
}

impl EventHooks {
    pub fn on_placement_email<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PlacementEmailEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_placement_email = Some(Arc::new(f));
        self
    }

    pub fn on_placement_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PlacementFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_placement_failed = Some(Arc::new(f));
        self
    }

    pub fn on_order_confirmation<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_confirmation = Some(Arc::new(f));
        self
    }
}
