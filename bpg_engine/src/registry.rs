//! Process-wide registry of live push subscribers.
//!
//! At most one connection may be registered per (gateway, order) pair, and a registered connection
//! receives at most one message before it is closed and forgotten. The registry is shared between the
//! request-handling path (subscribe) and the dispatch path, so the map lives behind a single mutex and
//! `subscribe` is an atomic check-and-insert.

use std::{collections::HashMap, sync::Mutex};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    db_types::{Order, OrderStatus},
    traits::PushConnection,
};

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("A push subscription already exists for order #{order_id} on gateway #{gateway_id}")]
    AlreadySubscribed { gateway_id: i64, order_id: i64 },
    #[error("Order is already {0}; finished orders do not accept push subscriptions")]
    OrderClosed(OrderStatus),
}

#[derive(Default)]
pub struct WebSocketRegistry {
    connections: Mutex<HashMap<(i64, i64), Box<dyn PushConnection>>>,
}

impl WebSocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` as the single push subscriber for the order. Fails if the order has already
    /// settled, or if a subscription for the pair exists.
    pub fn subscribe(&self, order: &Order, connection: Box<dyn PushConnection>) -> Result<(), RegistryError> {
        if order.status.is_settled() {
            return Err(RegistryError::OrderClosed(order.status));
        }
        let key = (order.gateway_id, order.id);
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections.contains_key(&key) {
            return Err(RegistryError::AlreadySubscribed { gateway_id: key.0, order_id: key.1 });
        }
        connections.insert(key, connection);
        trace!("📡️ Push subscription registered for order #{} on gateway #{}", key.1, key.0);
        Ok(())
    }

    /// Deliver `payload` to the order's subscriber, if one is connected, then close the connection and
    /// drop the registration. No subscriber means the push is silently skipped; delivery is
    /// exactly-once-if-connected, best-effort otherwise.
    pub async fn dispatch(&self, gateway_id: i64, order_id: i64, payload: String) {
        // Take the connection out under the lock; the send itself must not hold it.
        let conn = {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections.remove(&(gateway_id, order_id))
        };
        let Some(mut conn) = conn else {
            trace!("📡️ No push subscriber for order #{order_id} on gateway #{gateway_id}; skipping");
            return;
        };
        if let Err(e) = conn.send_text(payload).await {
            warn!("📡️ Push delivery for order #{order_id} failed: {e}");
        } else {
            debug!("📡️ Push delivered for order #{order_id} on gateway #{gateway_id}");
        }
        conn.close().await;
    }

    /// Drop a registration without sending anything (connection closed from the client side).
    pub fn unsubscribe(&self, gateway_id: i64, order_id: i64) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections.remove(&(gateway_id, order_id)).is_some() {
            trace!("📡️ Push subscription removed for order #{order_id} on gateway #{gateway_id}");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.connections.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bpg_common::Sats;
    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::traits::PushError;

    struct ChannelPush {
        sender: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl PushConnection for ChannelPush {
        async fn send_text(&mut self, payload: String) -> Result<(), PushError> {
            self.sender.send(payload).map_err(|e| PushError(e.to_string()))
        }

        async fn close(&mut self) {}
    }

    fn order(id: i64, status: OrderStatus) -> Order {
        Order {
            id,
            gateway_id: 1,
            keychain_index: id,
            address: format!("addr-{id}"),
            amount: Sats::from(1000),
            amount_paid: Sats::from(0),
            status,
            reused_count: 0,
            callback_url: None,
            callback_data: None,
            callback_response: None,
            created_at: Utc::now(),
            transactions: Vec::new(),
        }
    }

    fn channel_push() -> (Box<ChannelPush>, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Box::new(ChannelPush { sender }), receiver)
    }

    #[tokio::test]
    async fn delivers_exactly_once_and_cleans_up() {
        let registry = Arc::new(WebSocketRegistry::new());
        let (conn, mut rx) = channel_push();
        registry.subscribe(&order(10, OrderStatus::New), conn).unwrap();
        assert_eq!(registry.subscriber_count(), 1);

        registry.dispatch(1, 10, "paid".to_string()).await;
        assert_eq!(rx.recv().await.unwrap(), "paid");
        assert_eq!(registry.subscriber_count(), 0);

        // a second dispatch has no subscriber and is silently skipped
        registry.dispatch(1, 10, "paid again".to_string()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn double_subscribe_is_rejected() {
        let registry = WebSocketRegistry::new();
        let (first, _rx1) = channel_push();
        let (second, _rx2) = channel_push();
        registry.subscribe(&order(7, OrderStatus::New), first).unwrap();
        let err = registry.subscribe(&order(7, OrderStatus::Unconfirmed), second).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadySubscribed { gateway_id: 1, order_id: 7 }));
    }

    #[tokio::test]
    async fn settled_orders_refuse_subscriptions() {
        let registry = WebSocketRegistry::new();
        for status in [OrderStatus::Paid, OrderStatus::Expired, OrderStatus::Canceled] {
            let (conn, _rx) = channel_push();
            let err = registry.subscribe(&order(3, status), conn).unwrap_err();
            assert!(matches!(err, RegistryError::OrderClosed(_)));
        }
    }

    #[tokio::test]
    async fn unsubscribe_discards_without_sending() {
        let registry = WebSocketRegistry::new();
        let (conn, mut rx) = channel_push();
        registry.subscribe(&order(5, OrderStatus::New), conn).unwrap();
        registry.unsubscribe(1, 5);
        registry.dispatch(1, 5, "nothing".to_string()).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.subscriber_count(), 0);
    }
}
