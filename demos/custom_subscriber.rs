//! # Example: custom_subscriber
//!
//! Demonstrates how to build and attach a custom event subscriber.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Inspect [`Event`] / [`EventKind`] for consumer and item metrics.
//! - Wire the subscriber in with [`Channel::builder`].
//!
//! ## Flow
//! ```text
//! Producer::send ──► BoundedQueue ──► Consumer loop
//!     │                                   ├─► publish(ConsumerStarted / CallbackFailed / ...)
//!     └─► publish(ProducerRejected)       └─► publish(ConsumerStopped / StopTimeout)
//!                      │
//!                      ▼
//!          Bus ──► subscriber_listener ──► SubscriberSet.emit() ──► Metrics.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chanvisor::{
    CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig, Event, EventKind,
    OverflowPolicy, Subscribe,
};

/// Counts failures and rejections, and prints lifecycle events.
/// In real life, you could export metrics, ship logs, or trigger alerts.
#[derive(Default)]
struct Metrics {
    failed: AtomicU64,
    rejected: AtomicU64,
}

#[async_trait::async_trait]
impl Subscribe for Metrics {
    async fn on_event(&self, ev: &Event) {
        let who = ev.consumer.as_deref().unwrap_or("<unknown>");
        match ev.kind {
            EventKind::ConsumerStarted => println!("[sub] started:  consumer={who}"),
            EventKind::ConsumerStopped => println!(
                "[sub] stopped:  consumer={who} reason={}",
                ev.reason.as_deref().unwrap_or("<none>")
            ),
            EventKind::CallbackFailed | EventKind::CallbackPanicked => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                println!(
                    "[sub] failed:   consumer={who} reason={}",
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::ProducerRejected => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                println!(
                    "[sub] rejected: channel={who} depth={}",
                    ev.depth.unwrap_or(0)
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::default());

    let cfg = ChannelConfig {
        name: "jobs".into(),
        capacity: 3,
        overflow: OverflowPolicy::Reject,
        ..ChannelConfig::default()
    };

    let job: CallbackRef<u32> = CallbackFn::arc("job", |n: u32| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if n % 4 == 0 {
            return Err(CallbackError::fail(format!("job {n} failed")));
        }
        Ok(())
    });

    let channel = Channel::<u32>::builder(cfg)
        .with_subscriber(metrics.clone())
        .build(job);
    channel.start()?;

    for n in 1..=12 {
        let _ = channel.try_send(n);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    channel.shutdown().await;
    // Let the subscriber worker catch up before reading the counters.
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!(
        "failed={} rejected={}",
        metrics.failed.load(Ordering::Relaxed),
        metrics.rejected.load(Ordering::Relaxed)
    );
    Ok(())
}
