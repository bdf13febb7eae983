//! # Example: supervised
//!
//! Supervised consumers acknowledge an item only after its callback finished,
//! so [`Channel::drain`] waits for processing, not just delivery. Failing and
//! panicking items are logged and counted; the consumer keeps going.
//!
//! The channel runs until Ctrl-C (or SIGTERM) and then shuts down gracefully.
//!
//! ## Run
//! ```bash
//! cargo run --example supervised
//! ```

use std::time::Duration;

use chanvisor::{CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig, ConsumerKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let cfg = ChannelConfig {
        name: "orders".into(),
        capacity: 16,
        consumers: 3,
        kind: ConsumerKind::Supervised,
        grace: Duration::from_secs(2),
        ..ChannelConfig::default()
    };

    let handle: CallbackRef<u64> = CallbackFn::arc("handle-order", |id: u64| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match id % 7 {
            3 => Err(CallbackError::fail(format!("order {id} rejected by validator"))),
            5 => panic!("order {id} corrupted"),
            _ => {
                println!("[orders] handled #{id}");
                Ok(())
            }
        }
    });

    let channel = Channel::new(cfg, handle);
    let producer = channel.producer();

    tokio::spawn(async move {
        for id in 0.. {
            if producer.send(id).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    });

    println!("running; press Ctrl-C to stop");
    let report = channel.run_until_signal().await?;

    for consumer in channel.consumers() {
        println!("{}: {:?}", consumer.name(), consumer.stats());
    }
    println!("graceful: {}", report.is_graceful());
    Ok(())
}
