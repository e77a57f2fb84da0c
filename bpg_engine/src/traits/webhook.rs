use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A fully built merchant callback: the GET target with its query string, and the hex HMAC signature that
/// goes into the `X-Signature` header.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: Url,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub code: u16,
    pub body: String,
}

#[derive(Debug, Clone, Error)]
#[error("Webhook transport error: {0}")]
pub struct TransportError(pub String);

/// Outbound HTTP delivery for merchant callbacks. A `TransportError` means the request never produced an
/// HTTP status (connect failure, timeout); non-200 responses are returned as `WebhookResponse` and judged
/// by the dispatcher.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &SignedRequest) -> Result<WebhookResponse, TransportError>;
}
