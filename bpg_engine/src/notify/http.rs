use async_trait::async_trait;
use reqwest::Client;

use crate::traits::{SignedRequest, TransportError, WebhookResponse, WebhookTransport};

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Production webhook transport over reqwest.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: &SignedRequest) -> Result<WebhookResponse, TransportError> {
        let response = self
            .client
            .get(request.url.clone())
            .header(SIGNATURE_HEADER, &request.signature)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let code = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(WebhookResponse { code, body })
    }
}
