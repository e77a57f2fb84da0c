//! Asynchronous merchant notification: a one-shot push and a retried, signed webhook per status change.

use std::{sync::Arc, time::Duration};

use log::*;
use tokio::sync::Semaphore;

use crate::{
    config::EngineConfig,
    db_types::{CallbackResponse, Gateway, Order},
    notify::{
        retry::RetrySchedule,
        webhook::{build_callback_request, order_event_payload},
    },
    registry::WebSocketRegistry,
    traits::{OrderStore, SignedRequest, WebhookTransport},
};

pub struct NotificationDispatcher {
    registry: Arc<WebSocketRegistry>,
    transport: Arc<dyn WebhookTransport>,
    store: Arc<dyn OrderStore>,
    initial_delay: Duration,
    ceiling: Duration,
    /// Caps the number of in-flight webhook retry sequences. A sequence can sleep for over an hour, so
    /// without a bound a burst of status changes could pin an unbounded number of tasks.
    inflight: Arc<Semaphore>,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<WebSocketRegistry>,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn OrderStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            store,
            initial_delay: Duration::from_secs(config.callback_initial_delay_secs),
            ceiling: Duration::from_secs(config.callback_attempt_timeframe_secs),
            inflight: Arc::new(Semaphore::new(config.max_inflight_notifications.max(1))),
        }
    }

    /// Notify the merchant of `order`'s current status. Fire-and-forget: the push and the webhook each
    /// run on their own task, nothing is reported back, and overlapping dispatches for the same order are
    /// independent of each other. Delivery is at-least-once; merchants must tolerate duplicates.
    pub async fn dispatch(&self, order: Order, gateway: Gateway) {
        self.dispatch_push(&order, &gateway);
        self.dispatch_webhook(&order, &gateway).await;
    }

    fn dispatch_push(&self, order: &Order, gateway: &Gateway) {
        let payload = order_event_payload(order, gateway).to_string();
        let registry = Arc::clone(&self.registry);
        let (gateway_id, order_id) = (order.gateway_id, order.id);
        tokio::spawn(async move {
            registry.dispatch(gateway_id, order_id, payload).await;
        });
    }

    async fn dispatch_webhook(&self, order: &Order, gateway: &Gateway) {
        let request = match build_callback_request(order, gateway) {
            Ok(Some(request)) => request,
            Ok(None) => {
                trace!("📣️ Order #{} has no callback URL; webhook skipped", order.id);
                return;
            },
            Err(e) => {
                warn!("📣️ {e}; webhook skipped");
                return;
            },
        };
        let permit = match Arc::clone(&self.inflight).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let transport = Arc::clone(&self.transport);
        let store = Arc::clone(&self.store);
        let schedule = RetrySchedule::new(self.initial_delay, self.ceiling);
        let order_id = order.id;
        tokio::spawn(async move {
            deliver_webhook(order_id, request, transport, store, schedule).await;
            drop(permit);
        });
    }
}

/// Run one webhook delivery sequence to completion. Every attempt outcome is recorded on the order;
/// exhausting the schedule is logged and otherwise swallowed: a missed callback must never halt order
/// processing, and the merchant can read the outcome from the order's `callback_response`.
async fn deliver_webhook(
    order_id: i64,
    request: SignedRequest,
    transport: Arc<dyn WebhookTransport>,
    store: Arc<dyn OrderStore>,
    mut schedule: RetrySchedule,
) {
    while let Some(delay) = schedule.next() {
        tokio::time::sleep(delay).await;
        let attempt = schedule.attempt();
        let outcome = match transport.send(&request).await {
            Ok(response) => {
                let ok = response.code == 200;
                let outcome = CallbackResponse { code: Some(response.code), body: response.body };
                if ok {
                    debug!("📣️ Webhook for order #{order_id} delivered on attempt {attempt}");
                } else {
                    warn!(
                        "📣️ Webhook for order #{order_id} attempt {attempt} got HTTP {}",
                        response.code
                    );
                }
                record_outcome(order_id, &store, &outcome).await;
                if ok {
                    return;
                }
                outcome
            },
            Err(e) => {
                warn!("📣️ Webhook for order #{order_id} attempt {attempt} failed in transport: {e}");
                let outcome = CallbackResponse { code: None, body: e.to_string() };
                record_outcome(order_id, &store, &outcome).await;
                outcome
            },
        };
        trace!("📣️ Order #{order_id} last callback outcome: {outcome:?}");
    }
    error!(
        "📣️ Webhook delivery for order #{order_id} exhausted its retry schedule after {} attempts; giving up",
        schedule.attempt()
    );
}

async fn record_outcome(order_id: i64, store: &Arc<dyn OrderStore>, outcome: &CallbackResponse) {
    if let Err(e) = store.update_callback_response(order_id, outcome).await {
        error!("📣️ Could not record callback outcome for order #{order_id}: {e}");
    }
}
