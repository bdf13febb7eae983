//! # Channel: one queue, its consumers and producers, one lifecycle.
//!
//! The [`Channel`] creates and owns the [`BoundedQueue`]; consumers and producers
//! only hold shared references to it.
//!
//! ## High-level architecture
//! ```text
//! Producer::send ──┐                            ┌──► Consumer "name-0" ──► callback(item)
//! Producer::send ──┼──► BoundedQueue<T> ────────┼──► Consumer "name-1" ──► callback(item)
//! Channel::send  ──┘    (capacity, overflow)    └──► Consumer "name-N" ──► callback(item)
//!                                                         │
//!                                    publish(Event) ──► Bus ──► SubscriberSet (optional)
//! ```
//!
//! ## Lifecycle
//! ```text
//! new / builder().build()   queue + N idle consumers
//! start() / run()           every consumer spawns its loop
//! stop()                    all consumers stop concurrently: cooperative, forced after grace
//! shutdown()                close queue → drain (bounded by grace) → stop()
//! run_until_signal()        start() → wait for SIGINT/SIGTERM/Ctrl-C → shutdown()
//! ```
//!
//! ## Example
//! ```rust
//! use chanvisor::{CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let cfg = ChannelConfig { capacity: 16, consumers: 2, ..ChannelConfig::default() };
//!
//!     let print: CallbackRef<String> = CallbackFn::arc("print", |line: String| async move {
//!         println!("{line}");
//!         Ok::<_, CallbackError>(())
//!     });
//!
//!     let channel = Channel::new(cfg, print);
//!     channel.start().unwrap();
//!     channel.send("hello".to_string()).await.unwrap();
//!     channel.drain().await;
//!
//!     let report = channel.stop().await;
//!     assert!(report.is_graceful());
//! }
//! ```

use std::sync::Arc;

use futures::future::join_all;
use tokio::{sync::broadcast, time};
use tokio_util::sync::CancellationToken;

use crate::{
    callbacks::CallbackRef,
    config::ChannelConfig,
    core::{
        builder::ChannelBuilder,
        consumer::{Consumer, StopOutcome},
        producer::Producer,
        shutdown,
    },
    error::{ConsumerError, Rejected, RuntimeError},
    events::{Bus, Event, EventKind},
    queue::BoundedQueue,
};

/// Outcome of stopping a channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Consumers that were running and are now stopped.
    pub stopped: Vec<String>,
    /// Subset of `stopped` that had to be aborted after the grace period.
    pub forced: Vec<String>,
}

impl StopReport {
    /// Whether every consumer stopped without forced cancellation.
    pub fn is_graceful(&self) -> bool {
        self.forced.is_empty()
    }
}

/// A bounded work queue bound to a set of consumers.
pub struct Channel<T: Send + 'static> {
    cfg: ChannelConfig,
    name: Arc<str>,
    queue: Arc<BoundedQueue<T>>,
    consumers: Vec<Arc<Consumer<T>>>,
    bus: Bus,
    /// Stops the subscriber listener; `None` without subscribers.
    listener: Option<CancellationToken>,
}

impl<T: Send + 'static> Channel<T> {
    /// Returns a builder, to register subscribers before building.
    pub fn builder(cfg: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder::new(cfg)
    }

    /// Creates the queue and `cfg.consumers` idle consumers running `callback`.
    ///
    /// Nothing is started; call [`start`](Self::start) or [`run`](Self::run).
    pub fn new(cfg: ChannelConfig, callback: CallbackRef<T>) -> Self {
        ChannelBuilder::new(cfg).build(callback)
    }

    pub(crate) fn assemble(
        cfg: ChannelConfig,
        queue: Arc<BoundedQueue<T>>,
        consumers: Vec<Arc<Consumer<T>>>,
        bus: Bus,
        listener: Option<CancellationToken>,
    ) -> Self {
        let name: Arc<str> = Arc::from(cfg.name.as_ref());
        Self {
            cfg,
            name,
            queue,
            consumers,
            bus,
            listener,
        }
    }

    /// Starts every consumer that is not running yet.
    ///
    /// Consumers that are already running are left alone. A consumer that is
    /// still stopping does not prevent the others from starting.
    ///
    /// # Errors
    /// - [`ConsumerError::Stopping`] for the first consumer whose stop is still in flight
    /// - [`ConsumerError::AlreadyRunning`] (with the channel name) if every consumer
    ///   was already running
    pub fn start(&self) -> Result<(), ConsumerError> {
        let mut started = 0usize;
        let mut stopping = None;
        for consumer in &self.consumers {
            match consumer.start() {
                Ok(()) => started += 1,
                Err(ConsumerError::AlreadyRunning { .. }) => {}
                Err(e) => {
                    tracing::warn!(
                        channel = %self.name,
                        consumer = consumer.name(),
                        label = e.as_label(),
                        "consumer not started"
                    );
                    stopping.get_or_insert(e);
                }
            }
        }

        if started > 0 {
            tracing::info!(
                channel = %self.name,
                started,
                consumers = self.consumers.len(),
                capacity = self.queue.capacity(),
                "channel started"
            );
            self.bus.publish(
                Event::new(EventKind::ChannelStarted)
                    .with_consumer(Arc::clone(&self.name))
                    .with_depth(self.queue.size()),
            );
        }

        match stopping {
            Some(e) => Err(e),
            None if started == 0 && !self.consumers.is_empty() => {
                Err(ConsumerError::AlreadyRunning {
                    name: self.name.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Initializes and starts consuming; same as [`start`](Self::start).
    pub fn run(&self) -> Result<(), ConsumerError> {
        self.start()
    }

    /// Stops every consumer concurrently.
    ///
    /// Each consumer is asked to stop cooperatively; those still busy after
    /// `cfg.grace` are aborted and listed in [`StopReport::forced`]. Items left
    /// in the queue stay there.
    pub async fn stop(&self) -> StopReport {
        let outcomes = join_all(
            self.consumers
                .iter()
                .map(|c| async move { (c.name().to_string(), c.stop().await) }),
        )
        .await;

        let mut report = StopReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                StopOutcome::Graceful => report.stopped.push(name),
                StopOutcome::Forced => {
                    report.forced.push(name.clone());
                    report.stopped.push(name);
                }
                StopOutcome::NotRunning => {}
            }
        }

        let depth = self.queue.size();
        tracing::info!(
            channel = %self.name,
            stopped = report.stopped.len(),
            forced = report.forced.len(),
            depth,
            "channel stopped"
        );
        self.bus.publish(
            Event::new(EventKind::ChannelStopped)
                .with_consumer(Arc::clone(&self.name))
                .with_depth(depth),
        );
        report
    }

    /// Closes the queue, waits (up to `cfg.grace`) for in-flight items, then stops.
    pub async fn shutdown(&self) -> StopReport {
        self.bus.publish(
            Event::new(EventKind::ShutdownRequested).with_consumer(Arc::clone(&self.name)),
        );
        self.close();

        if time::timeout(self.cfg.grace, self.drain()).await.is_err() {
            tracing::warn!(
                channel = %self.name,
                grace = ?self.cfg.grace,
                unfinished = self.queue.unfinished(),
                "queue not drained within grace period"
            );
        }
        self.stop().await
    }

    /// Starts consuming and runs until a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<StopReport, RuntimeError> {
        if let Err(e) = self.start() {
            tracing::debug!(
                channel = %self.name,
                label = e.as_label(),
                error = %e,
                "start before waiting for signal did not start every consumer"
            );
        }
        shutdown::wait_for_shutdown_signal().await?;
        tracing::info!(channel = %self.name, "shutdown signal received");
        Ok(self.shutdown().await)
    }

    /// Returns a new producer handle for this channel's queue.
    pub fn producer(&self) -> Producer<T> {
        Producer::attached(
            Arc::clone(&self.queue),
            self.bus.clone(),
            Arc::clone(&self.name),
        )
    }

    /// Enqueues an item; see [`Producer::send`].
    pub async fn send(&self, item: T) -> Result<(), Rejected<T>> {
        self.producer().send(item).await
    }

    /// Enqueues an item without suspending; see [`Producer::try_send`].
    pub fn try_send(&self, item: T) -> Result<(), Rejected<T>> {
        self.producer().try_send(item)
    }

    /// Stops accepting new items; buffered items are still delivered.
    pub fn close(&self) {
        self.queue.close();
    }

    /// Waits until every item sent so far has been finished.
    ///
    /// With supervised consumers this means processed; with plain consumers, dequeued.
    pub async fn drain(&self) {
        self.queue.join().await;
    }

    /// Current queue depth.
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the channel was built with.
    pub fn config(&self) -> &ChannelConfig {
        &self.cfg
    }

    /// The shared queue.
    pub fn queue(&self) -> &Arc<BoundedQueue<T>> {
        &self.queue
    }

    /// The channel's consumers.
    pub fn consumers(&self) -> &[Arc<Consumer<T>>] {
        &self.consumers
    }

    /// Subscribes to this channel's runtime events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

impl<T: Send + 'static> Drop for Channel<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.cancel();
        }
    }
}
