//! # Consumer: background loop that feeds queue items to a callback.
//!
//! A [`Consumer`] pulls items from a shared [`BoundedQueue`] and runs its
//! [`Callback`](crate::Callback) on each one, inside its own tokio task.
//!
//! ## Loop
//! ```text
//! start() ──► tokio::spawn(worker.run(token))
//!
//! loop {
//!   ├─► stop requested?            → exit (ConsumerStopped "stop_requested")
//!   ├─► select! {
//!   │     token.cancelled()        → exit (ConsumerStopped "cancelled")
//!   │     queue.dequeue_tracked()  → Closed: exit (ConsumerStopped "queue_closed")
//!   │   }
//!   ├─► Plain:      ack, then invoke(callback, item)
//!   └─► Supervised: invoke(callback, item), then ack (at most once)
//! }
//! ```
//!
//! ## Stop protocol
//! - `request_stop()` sets the cooperative flag only; a loop parked in `dequeue` stays parked.
//! - `stop()` sets the flag **and** cancels the token guarding the dequeue, then waits
//!   up to `grace` for the loop. A callback that outlives `grace` gets its task aborted
//!   (logged as a stop timeout). The dequeue is cancel-safe, so no item is lost.
//! - `abort()` skips the grace period.
//!
//! Callback failures never end the loop: they are logged, published and counted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    callbacks::CallbackRef,
    core::{
        runner::invoke,
        state::{ConsumerKind, ConsumerState, ConsumerStats, Counters, StateCell},
    },
    error::{ConsumerError, RuntimeError},
    events::{Bus, Event, EventKind},
    queue::{BoundedQueue, Delivery},
};

/// Default time `stop()` waits before aborting a consumer task.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Result of [`Consumer::stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop exited on its own within the grace period.
    Graceful,
    /// The grace period expired and the task was aborted.
    Forced,
    /// The consumer was not running (idle, already stopped, or another stop owns it).
    NotRunning,
}

/// State shared between a consumer handle and its running loop.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    stop_requested: AtomicBool,
    counters: Counters,
}

/// The active run: its cancellation token and task.
struct Run {
    token: CancellationToken,
    handle: JoinHandle<()>,
    generation: u64,
}

/// Pulls items from a queue and runs a callback on each one.
///
/// Construct with [`Consumer::new`] or [`Consumer::supervised`]; channels build
/// their consumers themselves.
pub struct Consumer<T: Send + 'static> {
    name: Arc<str>,
    kind: ConsumerKind,
    queue: Arc<BoundedQueue<T>>,
    callback: CallbackRef<T>,
    bus: Bus,
    grace: Duration,
    shared: Arc<Shared>,
    run: Mutex<Option<Run>>,
}

impl<T: Send + 'static> Consumer<T> {
    /// Creates an idle plain consumer: items are finished as soon as they are dequeued.
    pub fn new(
        name: impl Into<Arc<str>>,
        queue: Arc<BoundedQueue<T>>,
        callback: CallbackRef<T>,
    ) -> Self {
        Self::with_kind(name, ConsumerKind::Plain, queue, callback)
    }

    /// Creates an idle supervised consumer: each item is acknowledged after its
    /// callback returns, whether it succeeded or not.
    pub fn supervised(
        name: impl Into<Arc<str>>,
        queue: Arc<BoundedQueue<T>>,
        callback: CallbackRef<T>,
    ) -> Self {
        Self::with_kind(name, ConsumerKind::Supervised, queue, callback)
    }

    /// Creates an idle consumer of the given kind.
    pub fn with_kind(
        name: impl Into<Arc<str>>,
        kind: ConsumerKind,
        queue: Arc<BoundedQueue<T>>,
        callback: CallbackRef<T>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            queue,
            callback,
            bus: Bus::new(1),
            grace: DEFAULT_GRACE,
            shared: Arc::new(Shared {
                state: StateCell::new(),
                stop_requested: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            run: Mutex::new(None),
        }
    }

    /// Publishes this consumer's events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Sets how long [`stop`](Self::stop) waits before aborting the task.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Consumer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plain or supervised.
    pub fn kind(&self) -> ConsumerKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        self.shared.state.load()
    }

    /// Whether the loop is running (including while a stop is pending).
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            ConsumerState::Running | ConsumerState::Stopping
        )
    }

    /// Counters accumulated over every run of this consumer.
    pub fn stats(&self) -> ConsumerStats {
        self.shared.counters.snapshot()
    }

    /// Spawns the consume loop and returns immediately.
    ///
    /// A stopped consumer can be started again. Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - [`ConsumerError::AlreadyRunning`] if the loop is running
    /// - [`ConsumerError::Stopping`] if a stop is still in flight
    pub fn start(&self) -> Result<(), ConsumerError> {
        let mut run = self.lock_run();
        let generation = self.shared.state.begin_run().map_err(|state| match state {
            ConsumerState::Stopping => ConsumerError::Stopping {
                name: self.name.to_string(),
            },
            _ => ConsumerError::AlreadyRunning {
                name: self.name.to_string(),
            },
        })?;
        self.shared.stop_requested.store(false, Ordering::Release);

        let token = CancellationToken::new();
        let worker = Worker {
            name: Arc::clone(&self.name),
            kind: self.kind,
            queue: Arc::clone(&self.queue),
            callback: Arc::clone(&self.callback),
            bus: self.bus.clone(),
            shared: Arc::clone(&self.shared),
            generation,
        };
        let handle = tokio::spawn(worker.run(token.clone()));
        *run = Some(Run {
            token,
            handle,
            generation,
        });
        drop(run);

        tracing::debug!(consumer = %self.name, kind = ?self.kind, "consumer started");
        self.bus
            .publish(Event::new(EventKind::ConsumerStarted).with_consumer(Arc::clone(&self.name)));
        Ok(())
    }

    /// Sets the cooperative stop flag.
    ///
    /// The loop exits before its next dequeue. A loop parked on an empty queue
    /// stays parked until an item arrives; use [`stop`](Self::stop) to wake it.
    /// Returns `false` if the consumer was not running.
    pub fn request_stop(&self) -> bool {
        self.shared.stop_requested.store(true, Ordering::Release);
        let requested = self.shared.state.request_stop();
        if requested {
            self.bus.publish(
                Event::new(EventKind::ConsumerStopRequested)
                    .with_consumer(Arc::clone(&self.name)),
            );
        }
        requested
    }

    /// Stops the consumer: cooperative first, forced after the grace period.
    ///
    /// ### Flow
    /// 1. Set the stop flag and cancel the token guarding the blocking dequeue
    /// 2. Wait up to `grace` for the loop to exit (it finishes its current item)
    /// 3. Otherwise log a stop timeout, abort the task and wait for it to unwind
    ///
    /// Idempotent: stopping an idle or stopped consumer returns
    /// [`StopOutcome::NotRunning`].
    pub async fn stop(&self) -> StopOutcome {
        let Some(run) = self.take_run() else {
            return StopOutcome::NotRunning;
        };
        self.request_stop();
        run.token.cancel();

        let Run {
            mut handle,
            generation,
            ..
        } = run;

        let outcome = match time::timeout(self.grace, &mut handle).await {
            Ok(_) => StopOutcome::Graceful,
            Err(_elapsed) => {
                let err = RuntimeError::StopTimeout {
                    consumer: self.name.to_string(),
                    grace: self.grace,
                };
                tracing::warn!(
                    consumer = %self.name,
                    grace = ?self.grace,
                    label = err.as_label(),
                    "{err}"
                );
                self.bus.publish(
                    Event::new(EventKind::StopTimeout)
                        .with_consumer(Arc::clone(&self.name))
                        .with_grace(self.grace),
                );
                handle.abort();
                let _ = handle.await;
                StopOutcome::Forced
            }
        };
        self.shared.state.finish(generation);
        outcome
    }

    /// Forcibly cancels the loop without waiting.
    ///
    /// An item being processed by a supervised consumer is still acknowledged
    /// when its task is torn down.
    pub fn abort(&self) {
        let Some(run) = self.take_run() else {
            return;
        };
        self.shared.stop_requested.store(true, Ordering::Release);
        run.token.cancel();
        run.handle.abort();
        self.shared.state.finish(run.generation);
        tracing::debug!(consumer = %self.name, "consumer aborted");
    }

    fn take_run(&self) -> Option<Run> {
        self.lock_run().take()
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Everything the spawned loop needs, owned.
struct Worker<T: Send + 'static> {
    name: Arc<str>,
    kind: ConsumerKind,
    queue: Arc<BoundedQueue<T>>,
    callback: CallbackRef<T>,
    bus: Bus,
    shared: Arc<Shared>,
    generation: u64,
}

impl<T: Send + 'static> Worker<T> {
    async fn run(self, token: CancellationToken) {
        let mut exit = ExitGuard {
            name: Arc::clone(&self.name),
            bus: self.bus.clone(),
            shared: Arc::clone(&self.shared),
            generation: self.generation,
            reason: "aborted",
        };

        loop {
            if self.shared.stop_requested.load(Ordering::Acquire) {
                exit.reason = "stop_requested";
                break;
            }
            let delivery = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    exit.reason = "cancelled";
                    break;
                }
                res = self.queue.dequeue_tracked() => match res {
                    Ok(delivery) => delivery,
                    Err(_closed) => {
                        exit.reason = "queue_closed";
                        break;
                    }
                },
            };
            self.process(delivery).await;
        }
    }

    async fn process(&self, delivery: Delivery<T>) {
        let counters = &self.shared.counters;
        let (item, mut ticket) = delivery.into_parts();
        Counters::bump(&counters.delivered);

        if self.kind == ConsumerKind::Plain && ticket.ack() {
            Counters::bump(&counters.acked);
        }

        match invoke(self.callback.as_ref(), &self.name, item, &self.bus).await {
            Ok(()) => Counters::bump(&counters.succeeded),
            Err(_) => Counters::bump(&counters.failed),
        }

        if self.kind == ConsumerKind::Supervised {
            if ticket.ack() {
                Counters::bump(&counters.acked);
            } else {
                tracing::debug!(consumer = %self.name, "item already finalized; acknowledgment skipped");
            }
        }
    }
}

/// Marks the run stopped and reports why, however the loop ends (including abort).
struct ExitGuard {
    name: Arc<str>,
    bus: Bus,
    shared: Arc<Shared>,
    generation: u64,
    reason: &'static str,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.shared.state.finish(self.generation);
        tracing::debug!(consumer = %self.name, reason = self.reason, "consumer stopped");
        self.bus.publish(
            Event::new(EventKind::ConsumerStopped)
                .with_consumer(Arc::clone(&self.name))
                .with_reason(self.reason),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackFn;
    use crate::config::OverflowPolicy;
    use crate::error::CallbackError;

    const WAIT: Duration = Duration::from_secs(2);

    fn recording(seen: Arc<Mutex<Vec<u32>>>) -> CallbackRef<u32> {
        CallbackFn::arc("record", move |n: u32| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(n);
                Ok(())
            }
        })
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        time::timeout(WAIT, async {
            while !cond() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let q = Arc::new(BoundedQueue::unbounded());
        let c = Consumer::new("c", q, recording(Arc::default()));

        c.start().unwrap();
        assert_eq!(
            c.start(),
            Err(ConsumerError::AlreadyRunning { name: "c".into() })
        );
        c.stop().await;
    }

    #[tokio::test]
    async fn test_processes_in_fifo_order() {
        let q = Arc::new(BoundedQueue::unbounded());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let c = Consumer::new("c", q.clone(), recording(seen.clone()));
        c.start().unwrap();

        for i in 0..50 {
            q.enqueue(i).await.unwrap();
        }
        until(|| seen.lock().unwrap().len() == 50).await;
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
        assert_eq!(c.stop().await, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_loop() {
        let q = Arc::new(BoundedQueue::unbounded());
        let cb: CallbackRef<u32> = CallbackFn::arc("picky", |n: u32| async move {
            match n {
                1 => Err(CallbackError::fail("bad")),
                2 => panic!("worse"),
                _ => Ok(()),
            }
        });
        let c = Consumer::new("c", q.clone(), cb);
        c.start().unwrap();

        for i in 0..4 {
            q.enqueue(i).await.unwrap();
        }
        until(|| c.stats().delivered == 4).await;
        until(|| c.stats().succeeded + c.stats().failed == 4).await;

        let stats = c.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(c.state(), ConsumerState::Running);
        c.stop().await;
    }

    #[tokio::test]
    async fn test_stop_wakes_consumer_parked_on_empty_queue() {
        let q = Arc::new(BoundedQueue::<u32>::unbounded());
        let c = Consumer::new("c", q, recording(Arc::default())).with_grace(Duration::from_secs(30));
        c.start().unwrap();
        time::sleep(Duration::from_millis(10)).await;

        let outcome = time::timeout(WAIT, c.stop()).await.expect("stop must not hang");
        assert_eq!(outcome, StopOutcome::Graceful);
        assert_eq!(c.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_request_stop_alone_leaves_parked_loop_until_next_item() {
        let q = Arc::new(BoundedQueue::unbounded());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let c = Consumer::new("c", q.clone(), recording(seen.clone()));
        c.start().unwrap();
        time::sleep(Duration::from_millis(10)).await;

        assert!(c.request_stop());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(c.state(), ConsumerState::Stopping);

        // the parked dequeue takes this item, then the flag ends the loop
        q.enqueue(9).await.unwrap();
        until(|| c.state() == ConsumerState::Stopped).await;
        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_hung_callback_is_forced_after_grace() {
        let q = Arc::new(BoundedQueue::unbounded());
        let cb: CallbackRef<u32> = CallbackFn::arc("hang", |_n: u32| async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let c = Consumer::supervised("c", q.clone(), cb).with_grace(Duration::from_millis(20));
        c.start().unwrap();
        q.enqueue(1).await.unwrap();
        until(|| c.stats().delivered == 1).await;

        assert_eq!(c.stop().await, StopOutcome::Forced);
        assert_eq!(c.state(), ConsumerState::Stopped);
        // the aborted item was still acknowledged
        assert_eq!(q.unfinished(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let q = Arc::new(BoundedQueue::<u32>::unbounded());
        let c = Consumer::new("c", q, recording(Arc::default()));

        assert_eq!(c.stop().await, StopOutcome::NotRunning);
        assert_eq!(c.state(), ConsumerState::Idle);

        c.start().unwrap();
        assert_eq!(c.stop().await, StopOutcome::Graceful);
        assert_eq!(c.stop().await, StopOutcome::NotRunning);
        assert_eq!(c.stop().await, StopOutcome::NotRunning);
        assert_eq!(c.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let q = Arc::new(BoundedQueue::unbounded());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let c = Consumer::new("c", q.clone(), recording(seen.clone()));

        c.start().unwrap();
        c.stop().await;
        q.enqueue(1).await.unwrap();
        c.start().unwrap();

        until(|| seen.lock().unwrap().len() == 1).await;
        c.stop().await;
    }

    #[tokio::test]
    async fn test_closed_queue_ends_loop() {
        let q = Arc::new(BoundedQueue::<u32>::new(4, OverflowPolicy::Block));
        let c = Consumer::new("c", q.clone(), recording(Arc::default()));
        c.start().unwrap();

        q.close();
        until(|| c.state() == ConsumerState::Stopped).await;
        assert_eq!(c.stop().await, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_supervised_acks_after_callback() {
        let q = Arc::new(BoundedQueue::unbounded());
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let cb: CallbackRef<u32> = CallbackFn::arc("gated", move |_n: u32| {
            let mut rx = release_rx.clone();
            async move {
                let _ = rx.wait_for(|open| *open).await;
                Ok(())
            }
        });
        let c = Consumer::supervised("c", q.clone(), cb);
        c.start().unwrap();

        q.enqueue(1).await.unwrap();
        until(|| c.stats().delivered == 1).await;
        assert_eq!(q.size(), 0);
        assert_eq!(q.unfinished(), 1, "supervised item stays unfinished during callback");

        release_tx.send(true).unwrap();
        time::timeout(WAIT, q.join()).await.unwrap();
        assert_eq!(c.stats().acked, 1);
        c.stop().await;
    }
}
