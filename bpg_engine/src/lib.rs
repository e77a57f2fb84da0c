//! Bitcoin Payment Gateway engine
//!
//! The engine is the merchant-facing control plane of a non-custodial Bitcoin payment gateway. It owns the
//! lifecycle of an order from creation to final notification:
//!
//! 1. **Allocation** ([`keychain`]): every order receives a BIP32-style keychain index and address.
//!    Indices are minted monotonically, but a long enough run of expired, never-paid orders lets a slot be
//!    recycled rather than burning a fresh index for every abandoned checkout.
//! 2. **Secrets** ([`vault`]): merchant authentication keys are stored encrypted (AES-128-CBC) and only
//!    ever decrypted in memory. Every encryption verifies its own output before the record is released.
//! 3. **Notification** ([`notify`], [`registry`]): status changes fan out to the merchant over a signed
//!    webhook with bounded exponential retry, and to at most one waiting websocket per order.
//! 4. **Bookkeeping** ([`counters`]): optional live per-status order counters over an atomic key-value
//!    backend.
//!
//! The engine is storage- and chain-agnostic: all external collaborators are trait objects (see
//! [`traits`]), with a SQLite reference backend behind the `sqlite` feature. [`GatewayApi`] is the
//! composition root that wires the pieces together; [`events`] provides the pub-sub hook channel that
//! decouples order flow from notification delivery.

pub mod adapters;
pub mod config;
pub mod counters;
pub mod db_types;
pub mod events;
mod gateway;
pub mod helpers;
pub mod keychain;
pub mod notify;
pub mod registry;
mod static_gateways;
pub mod traits;
pub mod vault;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use adapters::{AdapterRegistry, UnknownAdapter};
pub use config::EngineConfig;
pub use counters::{CounterError, CounterStore, MemoryCounters};
pub use gateway::{GatewayApi, GatewayError};
pub use keychain::{Allocation, AllocationError, KeychainAllocator};
pub use notify::{wire_dispatcher, NotificationDispatcher, RetrySchedule};
pub use registry::{RegistryError, WebSocketRegistry};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use static_gateways::{StaticGatewayEntry, StaticGateways};
pub use vault::{SecretVault, VaultError};
