use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::{
    callbacks::CallbackRef,
    config::ChannelConfig,
    core::{channel::Channel, consumer::Consumer},
    events::Bus,
    queue::BoundedQueue,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Channel`] with optional subscribers.
pub struct ChannelBuilder {
    cfg: ChannelConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ChannelBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ChannelConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (consumer lifecycle, callback
    /// failures, rejections) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the channel: queue, `cfg.consumers` idle consumers, event bus.
    ///
    /// Consumers are not started. With subscribers, this spawns their workers
    /// and must run inside a tokio runtime.
    pub fn build<T: Send + 'static>(self, callback: CallbackRef<T>) -> Channel<T> {
        let cfg = self.cfg;
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let queue = Arc::new(BoundedQueue::new(cfg.capacity, cfg.overflow));

        let consumers = (0..cfg.consumers)
            .map(|i| {
                Arc::new(
                    Consumer::with_kind(
                        cfg.consumer_name(i),
                        cfg.kind,
                        Arc::clone(&queue),
                        Arc::clone(&callback),
                    )
                    .with_bus(bus.clone())
                    .with_grace(cfg.grace),
                )
            })
            .collect();

        let listener = (!self.subscribers.is_empty()).then(|| {
            let token = CancellationToken::new();
            subscriber_listener(
                &bus,
                SubscriberSet::new(self.subscribers, bus.clone()),
                token.clone(),
            );
            token
        });

        Channel::assemble(cfg, queue, consumers, bus, listener)
    }
}

/// Forwards bus events to the subscriber set until `token` is cancelled.
///
/// The set holds a bus sender, so the bus never closes on its own; the channel
/// cancels `token` when dropped. Events already on the bus are still forwarded,
/// then every subscriber worker finishes its queue.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => set.emit(ev),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged; events dropped");
                }
                Err(_) => break,
            }
        }
        set.shutdown().await;
    });
}
