//! Merchant notification delivery: signed webhooks with bounded retry, and one-shot push messages.

mod dispatcher;
mod http;
mod retry;
mod webhook;

use std::sync::Arc;

use log::error;

use crate::{events::EventHooks, traits::GatewaySource};

pub use dispatcher::NotificationDispatcher;
pub use http::{HttpTransport, SIGNATURE_HEADER};
pub use retry::RetrySchedule;
pub use webhook::{build_callback_request, order_event_payload, CallbackBuildError};

/// Register the standard status-changed hook: resolve the order's gateway and hand both to the
/// dispatcher. This is the glue the composition root installs at startup.
pub fn wire_dispatcher(
    hooks: &mut EventHooks,
    dispatcher: Arc<NotificationDispatcher>,
    gateways: Arc<dyn GatewaySource>,
) {
    hooks.on_order_status_changed(move |event| {
        let dispatcher = Arc::clone(&dispatcher);
        let gateways = Arc::clone(&gateways);
        Box::pin(async move {
            let order = event.order;
            match gateways.fetch_gateway(order.gateway_id).await {
                Ok(Some(gateway)) => dispatcher.dispatch(order, gateway).await,
                Ok(None) => error!("📣️ Order #{} references unknown gateway #{}", order.id, order.gateway_id),
                Err(e) => error!("📣️ Could not load gateway #{} for notification: {e}", order.gateway_id),
            }
        })
    });
}
