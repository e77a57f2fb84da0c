//! A config-backed [`GatewaySource`] for deployments that run without a database.
//!
//! Gateways are loaded once at startup from static configuration entries. Secrets in the entries are
//! stored encrypted (the same `ivHex:base64` records the SQLite backend uses) and are decrypted on load,
//! so the in-memory map holds ready-to-use gateways. Saves mutate the map only; the keychain counter
//! survives for the life of the process but is *not* written back to the config file, which is the
//! operator's tradeoff for running storageless.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use bpg_common::Secret;
use log::*;
use serde::Deserialize;

use crate::{
    db_types::Gateway,
    traits::{GatewaySource, StoreError},
    vault::{SecretVault, VaultError},
};

/// One gateway as it appears in static configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticGatewayEntry {
    pub id: i64,
    /// Encrypted secret record, `ivHex:base64Ciphertext`.
    pub secret: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub last_keychain_index: i64,
    #[serde(default)]
    pub test_last_keychain_index: i64,
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Per-gateway override of the engine-wide reuse threshold.
    pub reuse_threshold: Option<usize>,
    #[serde(default)]
    pub after_payment_redirect_to: Option<String>,
    #[serde(default)]
    pub auto_redirect: bool,
}

fn default_true() -> bool {
    true
}

pub struct StaticGateways {
    gateways: RwLock<HashMap<i64, Gateway>>,
}

impl StaticGateways {
    /// Build the source from config entries, decrypting every secret up front. A single undecryptable
    /// entry aborts the load: a gateway with a garbage secret would sign garbage webhooks.
    pub fn load(
        entries: Vec<StaticGatewayEntry>,
        vault: &SecretVault,
        default_reuse_threshold: usize,
    ) -> Result<Self, VaultError> {
        let mut gateways = HashMap::with_capacity(entries.len());
        for entry in entries {
            let secret = vault.decrypt(&entry.secret).map_err(|e| {
                error!("🔒️ Could not decrypt the secret for static gateway #{}. {e}", entry.id);
                e
            })?;
            let gateway = Gateway {
                id: entry.id,
                secret: secret.into(),
                active: entry.active,
                test_mode: entry.test_mode,
                last_keychain_index: entry.last_keychain_index,
                test_last_keychain_index: entry.test_last_keychain_index,
                callback_url: entry.callback_url,
                reuse_threshold: entry.reuse_threshold.unwrap_or(default_reuse_threshold),
                after_payment_redirect_to: entry.after_payment_redirect_to,
                auto_redirect: entry.auto_redirect,
            };
            if gateways.insert(gateway.id, gateway).is_some() {
                warn!("🔒️ Static gateway #{} is defined more than once; the last entry wins", entry.id);
            }
        }
        info!("🔒️ Loaded {} static gateway(s)", gateways.len());
        Ok(Self { gateways: RwLock::new(gateways) })
    }

    pub fn len(&self) -> usize {
        self.gateways.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GatewaySource for StaticGateways {
    async fn fetch_gateway(&self, id: i64) -> Result<Option<Gateway>, StoreError> {
        Ok(self.gateways.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned())
    }

    async fn save_gateway(&self, gateway: &Gateway) -> Result<(), StoreError> {
        let mut gateways = self.gateways.write().unwrap_or_else(|e| e.into_inner());
        match gateways.get_mut(&gateway.id) {
            Some(existing) => {
                *existing = gateway.clone();
                Ok(())
            },
            None => Err(StoreError(format!("Gateway #{} is not part of the static configuration", gateway.id))),
        }
    }
}
