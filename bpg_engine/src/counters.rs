//! Live per-gateway, per-status order counters.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::trace;
use thiserror::Error;

use crate::{
    db_types::OrderStatus,
    traits::{CounterBackend, CounterBackendError},
};

#[derive(Debug, Clone, Error)]
pub enum CounterError {
    /// Order counting is switched off by configuration. Callers get an explicit error rather than a
    /// silent no-op so that "zero" and "not tracked" stay distinguishable.
    #[error("Order counters are disabled by configuration")]
    CountersDisabled,
    #[error("{0}")]
    Backend(#[from] CounterBackendError),
}

/// Counter bookkeeping over an external atomic key-value store. All mutations go through the backend's
/// native atomic increment; there is no read-modify-write and no extra locking.
pub struct CounterStore {
    backend: Arc<dyn CounterBackend>,
    enabled: bool,
}

impl CounterStore {
    pub fn new(backend: Arc<dyn CounterBackend>, enabled: bool) -> Self {
        Self { backend, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Move an order between status buckets: decrement `old` (when present) and increment `new`.
    pub async fn adjust(
        &self,
        gateway_id: i64,
        old: Option<OrderStatus>,
        new: OrderStatus,
    ) -> Result<(), CounterError> {
        if !self.enabled {
            return Err(CounterError::CountersDisabled);
        }
        if let Some(old) = old {
            self.backend.incr(&counter_key(gateway_id, old), -1).await?;
        }
        let count = self.backend.incr(&counter_key(gateway_id, new), 1).await?;
        trace!("🧮️ Gateway #{gateway_id} now has {count} orders in status {new}");
        Ok(())
    }

    pub async fn get(&self, gateway_id: i64, status: OrderStatus) -> Result<i64, CounterError> {
        if !self.enabled {
            return Err(CounterError::CountersDisabled);
        }
        Ok(self.backend.get(&counter_key(gateway_id, status)).await?)
    }
}

fn counter_key(gateway_id: i64, status: OrderStatus) -> String {
    format!("gateway:{gateway_id}:orders:{status}")
}

/// An in-process [`CounterBackend`]. Counts do not survive a restart; deployments that need durable
/// counters plug in an external store instead.
#[derive(Default)]
pub struct MemoryCounters {
    counts: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl CounterBackend for MemoryCounters {
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CounterBackendError> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counts.entry(key.to_string()).or_insert(0);
        *entry += delta;
        Ok(*entry)
    }

    async fn get(&self, key: &str) -> Result<i64, CounterBackendError> {
        Ok(*self.counts.lock().unwrap_or_else(|e| e.into_inner()).get(key).unwrap_or(&0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn adjust_moves_orders_between_buckets() {
        let store = CounterStore::new(Arc::new(MemoryCounters::default()), true);
        store.adjust(1, None, OrderStatus::New).await.unwrap();
        store.adjust(1, None, OrderStatus::New).await.unwrap();
        store.adjust(1, Some(OrderStatus::New), OrderStatus::Paid).await.unwrap();
        assert_eq!(store.get(1, OrderStatus::New).await.unwrap(), 1);
        assert_eq!(store.get(1, OrderStatus::Paid).await.unwrap(), 1);
        // other gateways are untouched
        assert_eq!(store.get(2, OrderStatus::New).await.unwrap(), 0);
        assert_eq!(store.get(2, OrderStatus::Paid).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_counters_fail_loudly() {
        let store = CounterStore::new(Arc::new(MemoryCounters::default()), false);
        assert!(matches!(
            store.adjust(1, None, OrderStatus::New).await,
            Err(CounterError::CountersDisabled)
        ));
        assert!(matches!(store.get(1, OrderStatus::New).await, Err(CounterError::CountersDisabled)));
    }
}
