use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventChannel, EventProducer, Handler, OrderCreatedEvent, OrderStatusChangedEvent};

/// Producer handles passed into the composition root; one producer per wired hook.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub order_status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
}

pub struct EventHandlers {
    pub on_order_created: Option<EventChannel<OrderCreatedEvent>>,
    pub on_order_status_changed: Option<EventChannel<OrderStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, max_concurrent: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventChannel::new(buffer_size, max_concurrent, f));
        let on_order_status_changed =
            hooks.on_order_status_changed.map(|f| EventChannel::new(buffer_size, max_concurrent, f));
        Self { on_order_created, on_order_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(channel) = &self.on_order_created {
            result.order_created_producer.push(channel.subscribe());
        }
        if let Some(channel) = &self.on_order_status_changed {
            result.order_status_changed_producer.push(channel.subscribe());
        }
        result
    }

    /// Spawn each wired channel onto the runtime. Channels run until their last producer is dropped.
    pub fn start(self) {
        if let Some(channel) = self.on_order_created {
            tokio::spawn(channel.run());
        }
        if let Some(channel) = self.on_order_status_changed {
            tokio::spawn(channel.run());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }
}
