//! Merchant callback construction: the query string, the push payload, and the request signature.

use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::{
    db_types::{Gateway, Order},
    helpers::calculate_hmac,
    traits::SignedRequest,
};

#[derive(Debug, Clone, Error)]
#[error("Cannot build callback for order #{order_id}: {reason}")]
pub struct CallbackBuildError {
    pub order_id: i64,
    pub reason: String,
}

/// The public order fields shared by the webhook query string and the push payload.
pub fn order_event_payload(order: &Order, gateway: &Gateway) -> serde_json::Value {
    let txids: Vec<&str> = order.transactions.iter().map(|t| t.txid.as_str()).collect();
    let mut payload = json!({
        "order_id": order.id,
        "amount": order.amount.value(),
        "amount_in_btc": order.amount.to_btc_string(),
        "amount_paid_in_btc": order.amount_paid.to_btc_string(),
        "status": order.status.code(),
        "address": order.address,
        "tid": order.tid().unwrap_or(""),
        "transaction_ids": txids,
        "keychain_id": order.keychain_index,
        "last_keychain_id": gateway.current_keychain_index(),
        "after_payment_redirect_to": gateway.after_payment_redirect_to.clone().unwrap_or_default(),
        "auto_redirect": gateway.auto_redirect,
    });
    if let Some(data) = &order.callback_data {
        payload["callback_data"] = json!(data);
    }
    payload
}

/// Build and sign the webhook GET request for an order, or `None` when neither the order nor the gateway
/// carries a callback URL (nothing to deliver).
///
/// The signature is the hex HMAC-SHA256 of the request method concatenated with the full request URI,
/// keyed with the gateway's decrypted merchant secret. It travels in the `X-Signature` header.
pub fn build_callback_request(order: &Order, gateway: &Gateway) -> Result<Option<SignedRequest>, CallbackBuildError> {
    let target = order.callback_url.as_deref().or(gateway.callback_url.as_deref()).unwrap_or("");
    if target.is_empty() {
        return Ok(None);
    }
    let mut url = Url::parse(target)
        .map_err(|e| CallbackBuildError { order_id: order.id, reason: format!("invalid callback URL {target:?}: {e}") })?;
    let txids: Vec<&str> = order.transactions.iter().map(|t| t.txid.as_str()).collect();
    let txids_json = serde_json::to_string(&txids)
        .map_err(|e| CallbackBuildError { order_id: order.id, reason: e.to_string() })?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("order_id", &order.id.to_string())
            .append_pair("amount", &order.amount.value().to_string())
            .append_pair("amount_in_btc", &order.amount.to_btc_string())
            .append_pair("amount_paid_in_btc", &order.amount_paid.to_btc_string())
            .append_pair("status", &order.status.code().to_string())
            .append_pair("address", &order.address)
            .append_pair("tid", order.tid().unwrap_or(""))
            .append_pair("transaction_ids", &txids_json)
            .append_pair("keychain_id", &order.keychain_index.to_string())
            .append_pair("last_keychain_id", &gateway.current_keychain_index().to_string())
            .append_pair("after_payment_redirect_to", gateway.after_payment_redirect_to.as_deref().unwrap_or(""))
            .append_pair("auto_redirect", if gateway.auto_redirect { "true" } else { "false" });
        if let Some(data) = &order.callback_data {
            query.append_pair("callback_data", data);
        }
    }
    let signature =
        calculate_hmac(gateway.secret.reveal().as_bytes(), format!("GET{}", url.as_str()).as_bytes());
    Ok(Some(SignedRequest { url, signature }))
}
