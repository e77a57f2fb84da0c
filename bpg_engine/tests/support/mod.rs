//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicI64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use bpg_common::{Sats, Secret};
use chrono::{Duration, Utc};

use bpg_engine::{
    db_types::{CallbackResponse, Gateway, Order, OrderStatus, Transaction},
    traits::{
        AddressDeriver,
        BlockchainAdapter,
        BlockchainError,
        DerivationError,
        OrderInsert,
        OrderStore,
        PushConnection,
        PushError,
        SignedRequest,
        StoreError,
        TransportError,
        WebhookResponse,
        WebhookTransport,
    },
    SecretVault,
    SqliteDatabase,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
}

/// A fully migrated in-memory SQLite database with a throwaway server secret.
pub async fn new_db() -> SqliteDatabase {
    let vault = SecretVault::new(Secret::new("test-server-secret".to_string()));
    let db = SqliteDatabase::new_in_memory(vault).await.expect("Error creating in-memory database");
    db.migrate().await.expect("Error running DB migrations");
    db
}

pub fn gateway(id: i64, reuse_threshold: usize) -> Gateway {
    Gateway {
        id,
        secret: Secret::new("merchant-secret".to_string()),
        active: true,
        test_mode: false,
        last_keychain_index: 0,
        test_last_keychain_index: 0,
        callback_url: Some("https://merchant.example/hook".to_string()),
        reuse_threshold,
        after_payment_redirect_to: None,
        auto_redirect: false,
    }
}

/// A seedable [`OrderStore`] over a plain `Vec`. Paged queries follow the store contract
/// (`keychain_index DESC, reused_count DESC`).
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
    next_id: AtomicI64,
    /// Every callback outcome ever recorded, in order.
    callback_log: Mutex<Vec<(i64, CallbackResponse)>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(1), ..Self::default() }
    }

    /// Seed an order directly, bypassing the insert path.
    pub fn seed(&self, order: Order) {
        let mut orders = self.orders.lock().unwrap();
        self.next_id.fetch_max(order.id + 1, Ordering::SeqCst);
        orders.push(order);
    }

    pub fn callback_log(&self) -> Vec<(i64, CallbackResponse)> {
        self.callback_log.lock().unwrap().clone()
    }

    pub fn order(&self, id: i64) -> Option<Order> {
        self.orders.lock().unwrap().iter().find(|o| o.id == id).cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, insert: OrderInsert) -> Result<Order, StoreError> {
        let order = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            gateway_id: insert.gateway_id,
            keychain_index: insert.keychain_index,
            address: insert.address,
            amount: insert.amount,
            amount_paid: Sats::from(0),
            status: OrderStatus::New,
            reused_count: insert.reused_count,
            callback_url: insert.callback_url,
            callback_data: insert.callback_data,
            callback_response: None,
            created_at: Utc::now(),
            transactions: Vec::new(),
        };
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.order(id))
    }

    async fn orders_page(&self, gateway_id: i64, limit: usize, offset: usize) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> =
            self.orders.lock().unwrap().iter().filter(|o| o.gateway_id == gateway_id).cloned().collect();
        orders.sort_by(|a, b| {
            b.keychain_index.cmp(&a.keychain_index).then(b.reused_count.cmp(&a.reused_count))
        });
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus, amount_paid: Sats) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError(format!("Order #{order_id} does not exist")))?;
        order.status = status;
        order.amount_paid = amount_paid;
        Ok(())
    }

    async fn update_callback_response(
        &self,
        order_id: i64,
        response: &CallbackResponse,
    ) -> Result<(), StoreError> {
        self.callback_log.lock().unwrap().push((order_id, response.clone()));
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.iter_mut().find(|o| o.id == order_id) {
            order.callback_response = Some(response.clone());
        }
        Ok(())
    }

    async fn upsert_transaction(&self, order_id: i64, tx: &Transaction) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError(format!("Order #{order_id} does not exist")))?;
        match order.transactions.iter_mut().find(|t| t.txid == tx.txid) {
            Some(existing) => *existing = tx.clone(),
            None => order.transactions.push(tx.clone()),
        }
        Ok(())
    }
}

/// A chain view backed by a fixed transaction map. Addresses not in the map are quiet.
#[derive(Debug, Default)]
pub struct StaticChain {
    txs: Mutex<HashMap<String, Vec<Transaction>>>,
}

impl StaticChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `address` as having on-chain activity.
    pub fn mark_busy<S: Into<String>>(&self, address: S) {
        let tx = Transaction {
            txid: "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16".to_string(),
            amount: Sats::from(50_000),
            confirmations: 3,
            block_height: Some(170),
        };
        self.txs.lock().unwrap().insert(address.into(), vec![tx]);
    }
}

#[async_trait]
impl BlockchainAdapter for StaticChain {
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<Transaction>, BlockchainError> {
        Ok(self.txs.lock().unwrap().get(address).cloned().unwrap_or_default())
    }
}

/// Derives `addr:{gateway}:{index}`: deterministic, collision-free, and easy to assert on.
pub struct IndexDeriver;

impl AddressDeriver for IndexDeriver {
    fn derive_address(&self, gateway: &Gateway, keychain_index: i64) -> Result<String, DerivationError> {
        Ok(format!("addr:{}:{keychain_index}", gateway.id))
    }
}

/// A scriptable [`WebhookTransport`] that records every request. Scripted outcomes are served in order;
/// once exhausted, every call gets the fallback status code.
pub struct MockTransport {
    requests: Mutex<Vec<SignedRequest>>,
    script: Mutex<VecDeque<Result<WebhookResponse, TransportError>>>,
    fallback_code: u16,
}

impl MockTransport {
    pub fn always(code: u16) -> Self {
        Self { requests: Mutex::new(Vec::new()), script: Mutex::new(VecDeque::new()), fallback_code: code }
    }

    pub fn scripted<I>(outcomes: I, fallback_code: u16) -> Self
    where I: IntoIterator<Item = Result<WebhookResponse, TransportError>> {
        Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.into_iter().collect()),
            fallback_code,
        }
    }

    pub fn response(code: u16) -> Result<WebhookResponse, TransportError> {
        Ok(WebhookResponse { code, body: format!("HTTP {code}") })
    }

    pub fn connect_error() -> Result<WebhookResponse, TransportError> {
        Err(TransportError("connection refused".to_string()))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SignedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for MockTransport {
    async fn send(&self, request: &SignedRequest) -> Result<WebhookResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(WebhookResponse { code: self.fallback_code, body: format!("HTTP {}", self.fallback_code) }),
        }
    }
}

/// A push connection that forwards payloads to an mpsc channel.
pub struct ChannelPush {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelPush {
    pub fn new() -> (Box<ChannelPush>, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Box::new(ChannelPush { sender }), receiver)
    }
}

#[async_trait]
impl PushConnection for ChannelPush {
    async fn send_text(&mut self, payload: String) -> Result<(), PushError> {
        self.sender.send(payload).map_err(|e| PushError(e.to_string()))
    }

    async fn close(&mut self) {}
}

/// An expired order seeded `age_minutes` in the past on the given keychain slot.
pub fn expired_order(id: i64, gateway_id: i64, keychain_index: i64, age_minutes: i64) -> Order {
    seeded_order(id, gateway_id, keychain_index, age_minutes, OrderStatus::Expired)
}

pub fn seeded_order(id: i64, gateway_id: i64, keychain_index: i64, age_minutes: i64, status: OrderStatus) -> Order {
    Order {
        id,
        gateway_id,
        keychain_index,
        address: format!("addr:{gateway_id}:{keychain_index}"),
        amount: Sats::from(10_000),
        amount_paid: Sats::from(0),
        status,
        reused_count: 0,
        callback_url: None,
        callback_data: None,
        callback_response: None,
        created_at: Utc::now() - Duration::minutes(age_minutes),
        transactions: Vec::new(),
    }
}
