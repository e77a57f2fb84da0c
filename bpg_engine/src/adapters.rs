//! Named registries for pluggable blockchain adapters and address derivers.
//!
//! Deployments pick their chain view and derivation scheme by name (config string), so the wiring code
//! never has to know the concrete types. Registration happens once at startup; lookups are cheap clones
//! of `Arc` handles.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::traits::{AddressDeriver, BlockchainAdapter};

#[derive(Debug, Clone, Error)]
#[error("No adapter has been registered under the name '{0}'")]
pub struct UnknownAdapter(pub String);

#[derive(Default)]
pub struct AdapterRegistry {
    blockchains: HashMap<String, Arc<dyn BlockchainAdapter>>,
    derivers: HashMap<String, Arc<dyn AddressDeriver>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_blockchain<S: Into<String>>(&mut self, name: S, adapter: Arc<dyn BlockchainAdapter>) -> &mut Self {
        self.blockchains.insert(name.into(), adapter);
        self
    }

    pub fn register_deriver<S: Into<String>>(&mut self, name: S, deriver: Arc<dyn AddressDeriver>) -> &mut Self {
        self.derivers.insert(name.into(), deriver);
        self
    }

    pub fn blockchain(&self, name: &str) -> Result<Arc<dyn BlockchainAdapter>, UnknownAdapter> {
        self.blockchains.get(name).cloned().ok_or_else(|| UnknownAdapter(name.to_string()))
    }

    pub fn deriver(&self, name: &str) -> Result<Arc<dyn AddressDeriver>, UnknownAdapter> {
        self.derivers.get(name).cloned().ok_or_else(|| UnknownAdapter(name.to_string()))
    }

    pub fn blockchain_names(&self) -> Vec<&str> {
        self.blockchains.keys().map(String::as_str).collect()
    }

    pub fn deriver_names(&self) -> Vec<&str> {
        self.derivers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        db_types::{Gateway, Transaction},
        traits::{BlockchainError, DerivationError},
    };

    #[derive(Debug)]
    struct NullChain;

    #[async_trait]
    impl BlockchainAdapter for NullChain {
        async fn fetch_transactions(&self, _address: &str) -> Result<Vec<Transaction>, BlockchainError> {
            Ok(Vec::new())
        }
    }

    struct EchoDeriver;

    impl AddressDeriver for EchoDeriver {
        fn derive_address(&self, gateway: &Gateway, keychain_index: i64) -> Result<String, DerivationError> {
            Ok(format!("bc1-{}-{keychain_index}", gateway.id))
        }
    }

    #[test]
    fn lookup_by_name() {
        let mut registry = AdapterRegistry::new();
        registry.register_blockchain("electrum", Arc::new(NullChain)).register_deriver("bip84", Arc::new(EchoDeriver));
        assert!(registry.blockchain("electrum").is_ok());
        assert!(registry.deriver("bip84").is_ok());
        assert_eq!(registry.blockchain_names(), vec!["electrum"]);
    }

    #[test]
    fn unknown_names_are_errors() {
        let registry = AdapterRegistry::new();
        let err = registry.blockchain("nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(registry.deriver("nope").is_err());
    }
}
