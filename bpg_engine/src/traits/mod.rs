//! Interface contracts for the external collaborators of the engine.
//!
//! The engine core is deliberately storage- and chain-agnostic. Everything it needs from the outside world
//! is expressed as a trait in this module:
//!
//! * [`OrderStore`]: persistence and ordered history queries for orders.
//! * [`GatewaySource`]: gateway records, either persisted or static-config backed.
//! * [`BlockchainAdapter`]: on-chain transaction lookups for an address.
//! * [`AddressDeriver`]: deterministic address derivation from a keychain index.
//! * [`CounterBackend`]: an atomic key-value counter store.
//! * [`PushConnection`]: a single outbound push (websocket) handle.
//! * [`WebhookTransport`]: outbound delivery of signed merchant callbacks.
//!
//! All async seams are object-safe (`#[async_trait]`) so they can live behind `Arc<dyn _>` and cross task
//! boundaries.

mod blockchain;
mod counter_backend;
mod gateway_source;
mod order_store;
mod push;
mod webhook;

use thiserror::Error;

pub use blockchain::{AddressDeriver, BlockchainAdapter, BlockchainError, DerivationError};
pub use counter_backend::{CounterBackend, CounterBackendError};
pub use gateway_source::GatewaySource;
pub use order_store::{OrderInsert, OrderStore};
pub use push::{PushConnection, PushError};
pub use webhook::{SignedRequest, TransportError, WebhookResponse, WebhookTransport};

/// An error raised by a storage backend. Backend-specific failures are folded into a string so that the
/// engine does not leak storage-engine types through its API.
#[derive(Debug, Clone, Error)]
#[error("Storage backend error: {0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError(e.to_string())
    }
}
