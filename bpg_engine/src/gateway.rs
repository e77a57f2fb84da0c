//! The merchant-facing order API.
//!
//! [`GatewayApi`] is the composition root for order creation and status-change bookkeeping. It owns the
//! collaborators that the two flows touch (gateway source, order store, keychain allocator, address
//! deriver, counters and event producers) and serializes allocations per gateway so that concurrent
//! order creation can never hand the same keychain slot to two orders.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use log::*;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    counters::{CounterError, CounterStore},
    db_types::{NewOrder, Order, OrderStatus},
    events::{EventProducers, OrderCreatedEvent, OrderStatusChangedEvent},
    keychain::{AllocationError, KeychainAllocator},
    traits::{AddressDeriver, DerivationError, GatewaySource, OrderInsert, OrderStore, StoreError},
};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway #{0} does not exist")]
    GatewayNotFound(i64),
    #[error("Gateway #{0} is deactivated. New orders are not accepted")]
    InactiveGateway(i64),
    #[error("Could not allocate a keychain index. {0}")]
    Allocation(#[from] AllocationError),
    #[error("{0}")]
    Derivation(#[from] DerivationError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Counter(#[from] CounterError),
}

pub struct GatewayApi {
    gateways: Arc<dyn GatewaySource>,
    store: Arc<dyn OrderStore>,
    allocator: KeychainAllocator,
    deriver: Arc<dyn AddressDeriver>,
    counters: CounterStore,
    producers: EventProducers,
    // One async mutex per gateway. The outer std mutex only guards the map itself and is never held
    // across an await point.
    allocation_locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl GatewayApi {
    pub fn new(
        gateways: Arc<dyn GatewaySource>,
        store: Arc<dyn OrderStore>,
        allocator: KeychainAllocator,
        deriver: Arc<dyn AddressDeriver>,
        counters: CounterStore,
        producers: EventProducers,
    ) -> Self {
        Self { gateways, store, allocator, deriver, counters, producers, allocation_locks: StdMutex::new(HashMap::new()) }
    }

    /// Create a new order for the given gateway.
    ///
    /// The flow is: check that the gateway accepts orders, take the gateway's allocation lock, pick a
    /// keychain index (recycled or minted), derive the receiving address, persist the order, and publish
    /// an [`OrderCreatedEvent`]. When a fresh index was minted, the gateway's counter is bumped and saved
    /// *before* the order row exists, so a crash between the two steps burns an index rather than
    /// double-allocating one.
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, GatewayError> {
        let gateway_id = request.gateway_id;
        let gateway =
            self.gateways.fetch_gateway(gateway_id).await?.ok_or(GatewayError::GatewayNotFound(gateway_id))?;
        if !gateway.active {
            info!("📦️ Rejecting order for deactivated gateway #{gateway_id}");
            return Err(GatewayError::InactiveGateway(gateway_id));
        }
        let lock = self.allocation_lock(gateway_id);
        let _guard = lock.lock().await;
        // Re-fetch under the lock so the keychain counter reflects any allocation that ran while we
        // waited for it.
        let mut gateway =
            self.gateways.fetch_gateway(gateway_id).await?.ok_or(GatewayError::GatewayNotFound(gateway_id))?;
        let allocation = self.allocator.allocate(&gateway, request.keychain_index).await?;
        let address = self.deriver.derive_address(&gateway, allocation.keychain_index)?;
        if allocation.minted {
            gateway.bump_keychain_index();
            self.gateways.save_gateway(&gateway).await?;
        }
        let reused_count = allocation.reused_from.as_ref().map(|o| o.reused_count + 1).unwrap_or_default();
        let order = self
            .store
            .insert_order(OrderInsert {
                gateway_id,
                keychain_index: allocation.keychain_index,
                address,
                amount: request.amount,
                reused_count,
                callback_url: request.callback_url,
                callback_data: request.callback_data,
            })
            .await?;
        drop(_guard);
        debug!(
            "📦️ Created order #{} on gateway #{gateway_id} (keychain index {}, {})",
            order.id,
            order.keychain_index,
            if allocation.minted { "minted" } else { "recycled" }
        );
        if self.counters.enabled() {
            if let Err(e) = self.counters.adjust(gateway_id, None, OrderStatus::New).await {
                error!("🔢️ Could not bump the order counters for gateway #{gateway_id}. {e}");
            }
        }
        for producer in &self.producers.order_created_producer {
            producer.publish_event(OrderCreatedEvent { order: order.clone() }).await;
        }
        Ok(order)
    }

    /// Bookkeeping for a status transition that the status-check engine has already persisted.
    ///
    /// Counter and notification failures are logged, never propagated: a flaky merchant endpoint or
    /// counter backend must not stall payment processing.
    pub async fn order_status_changed(&self, old_status: Option<OrderStatus>, order: Order) {
        if self.counters.enabled() {
            if let Err(e) = self.counters.adjust(order.gateway_id, old_status, order.status).await {
                error!("🔢️ Could not adjust the order counters for gateway #{}. {e}", order.gateway_id);
            }
        }
        for producer in &self.producers.order_status_changed_producer {
            producer.publish_event(OrderStatusChangedEvent { old_status, order: order.clone() }).await;
        }
    }

    pub fn orders(&self) -> Arc<dyn OrderStore> {
        Arc::clone(&self.store)
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    fn allocation_lock(&self, gateway_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.allocation_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(gateway_id).or_default())
    }
}
