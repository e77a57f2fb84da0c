use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus};

/// Emitted after a new order has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted whenever the external status-check engine reports a status transition. This is the event that
/// drives merchant notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    /// The status before the transition, when known. `None` for transitions reported without history.
    pub old_status: Option<OrderStatus>,
    /// The order as it is after the transition.
    pub order: Order,
}

impl OrderStatusChangedEvent {
    pub fn new(old_status: Option<OrderStatus>, order: Order) -> Self {
        Self { old_status, order }
    }
}
