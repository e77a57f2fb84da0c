use async_trait::async_trait;
use thiserror::Error;

use crate::db_types::{Gateway, Transaction};

#[derive(Debug, Clone, Error)]
#[error("Blockchain adapter error: {0}")]
pub struct BlockchainError(pub String);

/// A view onto the chain, provided by an external watching component.
///
/// The engine only ever asks one question of the chain directly: "which transactions touch this address?".
/// It is used as the final, live check before a keychain slot is recycled, so implementations must not
/// serve stale cached data for that call.
#[async_trait]
pub trait BlockchainAdapter: Send + Sync + std::fmt::Debug {
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<Transaction>, BlockchainError>;
}

#[derive(Debug, Clone, Error)]
#[error("Address derivation failed for keychain index {index}: {reason}")]
pub struct DerivationError {
    pub index: i64,
    pub reason: String,
}

/// Derives a receiving address from a gateway's key material and a keychain index (BIP32-style
/// hierarchical derivation). Derivation is deterministic: the same index always yields the same address.
pub trait AddressDeriver: Send + Sync {
    fn derive_address(&self, gateway: &Gateway, keychain_index: i64) -> Result<String, DerivationError>;
}
