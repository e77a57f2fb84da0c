//! `SqliteDatabase` is the persisted-store backend of the engine.
//!
//! It implements [`OrderStore`] and [`GatewaySource`] over a SQLite pool. Gateway secrets are stored
//! encrypted; the database owns a [`SecretVault`] and decrypts on fetch, so plaintext secrets only ever
//! exist in memory.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bpg_common::Sats;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, gateways, new_pool, orders};
use crate::{
    db_types::{CallbackResponse, Gateway, Order, OrderStatus, Transaction},
    traits::{GatewaySource, OrderInsert, OrderStore, StoreError},
    vault::{SecretVault, VaultError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    vault: Arc<SecretVault>,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new(max_connections: u32, vault: SecretVault) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections, vault).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32, vault: SecretVault) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, vault: Arc::new(vault) })
    }

    /// An in-memory database for tests. Must stay at one connection: every connection to
    /// `sqlite::memory:` is its own database.
    pub async fn new_in_memory(vault: SecretVault) -> Result<Self, sqlx::Error> {
        Self::new_with_url("sqlite::memory:", 1, vault).await
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        debug!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a new gateway, encrypting `secret` before it touches the disk. The encryption IV is
    /// derived from the highest gateway id at the time of the insert.
    pub async fn insert_gateway(
        &self,
        secret: &str,
        callback_url: Option<&str>,
        reuse_threshold: usize,
    ) -> Result<Gateway, StoreError> {
        let mut tx = self.pool.begin().await?;
        let max_id = gateways::max_gateway_id(&mut tx).await?;
        let record = self.vault.encrypt(secret, max_id).map_err(vault_to_store)?;
        let row = gateways::insert_gateway(&record, callback_url, reuse_threshold as i64, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Gateway #{} registered", row.id);
        self.row_to_gateway(row)
    }

    fn row_to_gateway(&self, row: gateways::GatewayRow) -> Result<Gateway, StoreError> {
        let secret = self.vault.decrypt(&row.secret).map_err(|e| {
            error!("🔒️ Could not decrypt the secret for gateway #{}. {e}", row.id);
            vault_to_store(e)
        })?;
        Ok(Gateway {
            id: row.id,
            secret: secret.into(),
            active: row.active,
            test_mode: row.test_mode,
            last_keychain_index: row.last_keychain_index,
            test_last_keychain_index: row.test_last_keychain_index,
            callback_url: row.callback_url,
            reuse_threshold: usize::try_from(row.reuse_threshold).unwrap_or_default(),
            after_payment_redirect_to: row.after_payment_redirect_to,
            auto_redirect: row.auto_redirect,
        })
    }
}

fn vault_to_store(e: VaultError) -> StoreError {
    StoreError(e.to_string())
}

#[async_trait]
impl GatewaySource for SqliteDatabase {
    async fn fetch_gateway(&self, id: i64) -> Result<Option<Gateway>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match gateways::fetch_gateway(id, &mut conn).await? {
            Some(row) => Ok(Some(self.row_to_gateway(row)?)),
            None => Ok(None),
        }
    }

    async fn save_gateway(&self, gateway: &Gateway) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let found = gateways::save_gateway(
            gateway.id,
            gateway.active,
            gateway.test_mode,
            gateway.last_keychain_index,
            gateway.test_last_keychain_index,
            gateway.callback_url.as_deref(),
            gateway.reuse_threshold as i64,
            gateway.after_payment_redirect_to.as_deref(),
            gateway.auto_redirect,
            &mut conn,
        )
        .await?;
        if !found {
            return Err(StoreError(format!("Gateway #{} does not exist", gateway.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for SqliteDatabase {
    async fn insert_order(&self, order: OrderInsert) -> Result<Order, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::insert_order(order, &mut conn).await?)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn orders_page(&self, gateway_id: i64, limit: usize, offset: usize) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::orders_page(gateway_id, limit, offset, &mut conn).await?)
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus, amount_paid: Sats) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::update_status(order_id, status, amount_paid, &mut conn).await?)
    }

    async fn update_callback_response(
        &self,
        order_id: i64,
        response: &CallbackResponse,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::update_callback_response(order_id, response, &mut conn).await?)
    }

    async fn upsert_transaction(&self, order_id: i64, tx: &Transaction) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::upsert_transaction(order_id, tx, &mut conn).await?)
    }
}
