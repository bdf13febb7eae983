//! # Example: basic_channel
//!
//! A channel with two consumers printing lines sent by a producer.
//!
//! Shows how to:
//! - Build a [`ChannelConfig`] and a [`CallbackFn`].
//! - Start consumers, send items and drain the queue.
//! - Stop the channel and read the [`StopReport`](chanvisor::StopReport).
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example basic_channel
//! ```

use std::time::Duration;

use chanvisor::{CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = ChannelConfig {
        name: "lines".into(),
        capacity: 4,
        consumers: 2,
        ..ChannelConfig::default()
    };

    let print: CallbackRef<String> = CallbackFn::arc("print", |line: String| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("[print] {line}");
        Ok::<_, CallbackError>(())
    });

    let channel = Channel::new(cfg, print);
    channel.start()?;

    let producer = channel.producer();
    for i in 0..10 {
        producer.send(format!("line #{i}")).await?;
    }

    channel.drain().await;
    let report = channel.stop().await;
    println!("stopped: {:?} (graceful: {})", report.stopped, report.is_graceful());
    Ok(())
}
