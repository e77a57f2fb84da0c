use async_trait::async_trait;
use bpg_common::Sats;

use crate::{
    db_types::{CallbackResponse, Order, OrderStatus, Transaction},
    traits::StoreError,
};

/// The persistable fields of a freshly allocated order. The store assigns the id, timestamps and the
/// initial `New` status.
#[derive(Debug, Clone)]
pub struct OrderInsert {
    pub gateway_id: i64,
    pub keychain_index: i64,
    pub address: String,
    pub amount: Sats,
    pub reused_count: i64,
    pub callback_url: Option<String>,
    pub callback_data: Option<String>,
}

/// Order persistence, as provided by the storage engine.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: OrderInsert) -> Result<Order, StoreError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError>;

    /// One page of the gateway's order history for allocation scans.
    ///
    /// Results must be ordered by `keychain_index` descending, then `reused_count` descending, so that the
    /// first record for any keychain slot within a page is the authoritative (most-recycled) one.
    async fn orders_page(&self, gateway_id: i64, limit: usize, offset: usize) -> Result<Vec<Order>, StoreError>;

    /// Record a status transition driven by the external status-check engine.
    async fn update_status(&self, order_id: i64, status: OrderStatus, amount_paid: Sats) -> Result<(), StoreError>;

    /// Record the outcome of the latest webhook delivery attempt. This is the only mutation allowed on
    /// settled orders.
    async fn update_callback_response(
        &self,
        order_id: i64,
        response: &CallbackResponse,
    ) -> Result<(), StoreError>;

    /// Append an observed on-chain transaction, deduplicating by `txid`.
    async fn upsert_transaction(&self, order_id: i64, tx: &Transaction) -> Result<(), StoreError>;
}
