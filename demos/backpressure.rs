//! # Example: backpressure
//!
//! A fast producer against a slow consumer with a small queue.
//!
//! With [`OverflowPolicy::Block`] the producer is paced by the consumer.
//! With [`OverflowPolicy::Reject`] the overflowing items are handed back.
//!
//! ## Run
//! ```bash
//! cargo run --example backpressure
//! ```

use std::time::{Duration, Instant};

use chanvisor::{CallbackFn, CallbackRef, Channel, ChannelConfig, OverflowPolicy};

fn slow() -> CallbackRef<u32> {
    CallbackFn::arc("slow", |n: u32| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!("  processed {n}");
        Ok(())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("== block ==");
    let blocking = Channel::new(
        ChannelConfig {
            name: "block".into(),
            capacity: 2,
            overflow: OverflowPolicy::Block,
            ..ChannelConfig::default()
        },
        slow(),
    );
    blocking.start()?;
    let started = Instant::now();
    for n in 0..8 {
        blocking.send(n).await?;
        println!("sent {n} after {:?} (depth {})", started.elapsed(), blocking.size());
    }
    blocking.shutdown().await;

    println!("== reject ==");
    let rejecting = Channel::new(
        ChannelConfig {
            name: "reject".into(),
            capacity: 2,
            overflow: OverflowPolicy::Reject,
            ..ChannelConfig::default()
        },
        slow(),
    );
    rejecting.start()?;
    let mut dropped = Vec::new();
    for n in 0..8 {
        if let Err(rejected) = rejecting.try_send(n) {
            println!("rejected {n}: {}", rejected.error());
            dropped.push(rejected.into_inner());
        }
    }
    rejecting.shutdown().await;
    println!("handed back: {dropped:?}");
    Ok(())
}
