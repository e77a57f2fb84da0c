//! Simple stateless pub-sub event channel.
//!
//! Components subscribe to gateway events (order created, order status changed) and react to them without
//! access to any internal engine state; all a handler receives is the event itself. Handlers are async,
//! and the number of handler invocations running concurrently is bounded: each event acquires a permit
//! before its handler task is spawned, so a flood of status changes cannot spawn an unbounded number of
//! tasks.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
};

use log::*;
use tokio::sync::{mpsc, Semaphore};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventChannel<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
    max_concurrent: usize,
}

impl<E: Send + Sync + 'static> EventChannel<E> {
    pub fn new(buffer_size: usize, max_concurrent: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler, max_concurrent: max_concurrent.max(1) }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Run the channel until every producer has been dropped, then wait for in-flight handlers to finish.
    pub async fn run(mut self) {
        debug!("📬️ Event channel started (max {} concurrent handlers)", self.max_concurrent);
        // Drop the internal sender so the channel shuts down once the last external producer goes away.
        drop(self.sender);
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        while let Some(event) = self.listener.recv().await {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                (handler)(event).await;
                drop(permit);
            });
        }
        // Draining the semaphore waits for every spawned handler to release its permit.
        match Arc::clone(&permits).acquire_many_owned(self.max_concurrent as u32).await {
            Ok(_) => debug!("📬️ Event channel shut down gracefully"),
            Err(e) => warn!("📬️ Event channel shutdown was interrupted: {e}"),
        }
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}
