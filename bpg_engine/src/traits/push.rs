use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Push delivery failed: {0}")]
pub struct PushError(pub String);

/// A single outbound push handle (in production, the server side of an accepted websocket).
///
/// The registry owns the connection exclusively, sends at most one message over it, and always closes it
/// afterwards.
#[async_trait]
pub trait PushConnection: Send + Sync {
    async fn send_text(&mut self, payload: String) -> Result<(), PushError>;

    async fn close(&mut self);
}
