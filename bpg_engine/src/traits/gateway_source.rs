use async_trait::async_trait;

use crate::{db_types::Gateway, traits::StoreError};

/// Access to gateway records.
///
/// Two implementations exist and one is selected at startup: the persisted-store-backed
/// [`crate::SqliteDatabase`] and the static-config-backed [`crate::StaticGateways`]. Gateways returned from
/// a source always carry the *decrypted* merchant secret; encryption is a concern of the source itself.
#[async_trait]
pub trait GatewaySource: Send + Sync {
    async fn fetch_gateway(&self, id: i64) -> Result<Option<Gateway>, StoreError>;

    /// Persist mutated gateway state. In practice the only field that changes at runtime is the keychain
    /// counter, bumped after every non-reused allocation.
    async fn save_gateway(&self, gateway: &Gateway) -> Result<(), StoreError>;
}
