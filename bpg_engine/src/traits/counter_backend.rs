use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Counter backend error: {0}")]
pub struct CounterBackendError(pub String);

/// An atomic key-value counter store (Redis-style).
///
/// Implementations must use the backing store's native atomic increment; the engine never performs a
/// read-modify-write cycle on counters.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Atomically add `delta` (which may be negative) to the counter at `key`, returning the new value.
    /// Missing keys start at zero.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CounterBackendError>;

    async fn get(&self, key: &str) -> Result<i64, CounterBackendError>;
}
