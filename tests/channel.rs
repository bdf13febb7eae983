use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use chanvisor::{
    CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig, ConsumerKind, ConsumerState,
    ConsumerStats, Event, EventKind, OverflowPolicy, QueueError, Subscribe,
};

const WAIT: Duration = Duration::from_secs(2);

fn recording(seen: Arc<Mutex<Vec<&'static str>>>) -> CallbackRef<&'static str> {
    CallbackFn::arc("record", move |item: &'static str| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(item);
            Ok(())
        }
    })
}

fn total(channel: &Channel<impl Send + 'static>) -> ConsumerStats {
    channel
        .consumers()
        .iter()
        .map(|c| c.stats())
        .fold(ConsumerStats::default(), |acc, s| ConsumerStats {
            delivered: acc.delivered + s.delivered,
            succeeded: acc.succeeded + s.succeeded,
            failed: acc.failed + s.failed,
            acked: acc.acked + s.acked,
        })
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    time::timeout(WAIT, async {
        while !cond() {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Default)]
struct Failures {
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

#[async_trait]
impl Subscribe for Failures {
    async fn on_event(&self, event: &Event) {
        match event.kind {
            EventKind::CallbackFailed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            EventKind::CallbackPanicked => {
                self.panicked.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "failures"
    }
}

#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "kinds"
    }
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn full_queue_blocks_producer_until_a_slot_frees() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cfg = ChannelConfig {
        name: "bp".into(),
        capacity: 2,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, recording(seen.clone()));

    channel.send("a").await.unwrap();
    channel.send("b").await.unwrap();

    let producer = channel.producer();
    let blocked = tokio::spawn(async move { producer.send("c").await });
    time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());
    assert_eq!(channel.size(), 2);

    channel.start().unwrap();
    time::timeout(WAIT, blocked).await.unwrap().unwrap().unwrap();
    time::timeout(WAIT, channel.drain()).await.unwrap();

    let report = channel.stop().await;
    assert_eq!(report.stopped, vec!["bp-0".to_string()]);
    assert!(report.is_graceful());
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn failing_item_is_reported_and_consumer_continues() {
    let failures = Arc::new(Failures::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cb: CallbackRef<&'static str> = {
        let seen = seen.clone();
        CallbackFn::arc("maybe-fail", move |item: &'static str| {
            let seen = seen.clone();
            async move {
                if item == "b" {
                    return Err(CallbackError::fail("bad item"));
                }
                seen.lock().unwrap().push(item);
                Ok(())
            }
        })
    };

    let cfg = ChannelConfig {
        name: "jobs".into(),
        kind: ConsumerKind::Supervised,
        ..ChannelConfig::default()
    };
    let channel = Channel::<&'static str>::builder(cfg)
        .with_subscriber(failures.clone())
        .build(cb);
    channel.start().unwrap();

    for item in ["a", "b", "c"] {
        channel.send(item).await.unwrap();
    }
    time::timeout(WAIT, channel.drain()).await.unwrap();

    let stats = total(&channel);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.acked, 3);
    assert_eq!(*seen.lock().unwrap(), vec!["a", "c"]);
    assert!(channel.consumers()[0].is_running());

    eventually(|| failures.failed.load(Ordering::SeqCst) == 1).await;
    channel.stop().await;
}

#[tokio::test]
async fn panicking_callback_is_isolated() {
    let failures = Arc::new(Failures::default());
    let cb: CallbackRef<u32> = CallbackFn::arc("explode", |n: u32| async move {
        if n == 0 {
            panic!("zero");
        }
        Ok(())
    });

    let cfg = ChannelConfig {
        kind: ConsumerKind::Supervised,
        ..ChannelConfig::default()
    };
    let channel = Channel::<u32>::builder(cfg)
        .with_subscribers(vec![failures.clone() as Arc<dyn Subscribe>])
        .build(cb);
    channel.start().unwrap();

    channel.send(0).await.unwrap();
    channel.send(1).await.unwrap();
    time::timeout(WAIT, channel.drain()).await.unwrap();

    let stats = total(&channel);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    eventually(|| failures.panicked.load(Ordering::SeqCst) == 1).await;
    assert!(channel.stop().await.is_graceful());
}

#[tokio::test]
async fn reject_policy_hands_item_back() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cfg = ChannelConfig {
        capacity: 1,
        overflow: OverflowPolicy::Reject,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, recording(seen));
    let mut events = channel.events();

    channel.try_send("a").unwrap();
    let rejected = channel.send("b").await.unwrap_err();
    assert_eq!(rejected.error(), QueueError::Full);
    assert_eq!(rejected.into_inner(), "b");
    assert_eq!(channel.size(), 1);

    let ev = time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(ev.kind, EventKind::ProducerRejected);
    assert_eq!(ev.reason.as_deref(), Some("queue_full"));
}

#[tokio::test]
async fn stop_wakes_consumers_parked_on_empty_queue() {
    let cfg = ChannelConfig {
        name: "idle".into(),
        consumers: 3,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, recording(Arc::default()));
    channel.start().unwrap();
    time::sleep(Duration::from_millis(10)).await;

    let report = time::timeout(WAIT, channel.stop()).await.unwrap();
    assert_eq!(report.stopped.len(), 3);
    assert!(report.is_graceful());
    for consumer in channel.consumers() {
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    let again = channel.stop().await;
    assert!(again.stopped.is_empty());
}

#[tokio::test]
async fn hanging_callback_is_forced_after_grace() {
    let cb: CallbackRef<u32> = CallbackFn::arc("hang", |_n: u32| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let cfg = ChannelConfig {
        name: "stuck".into(),
        grace: Duration::from_millis(50),
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, cb);
    let mut events = channel.events();
    channel.start().unwrap();
    channel.send(7).await.unwrap();

    let consumer = channel.consumers()[0].clone();
    eventually(|| consumer.stats().delivered == 1).await;

    let report = time::timeout(WAIT, channel.stop()).await.unwrap();
    assert_eq!(report.forced, vec!["stuck-0".to_string()]);
    assert_eq!(report.stopped, vec!["stuck-0".to_string()]);
    assert_eq!(consumer.state(), ConsumerState::Stopped);

    let mut saw_timeout = false;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::StopTimeout {
            assert_eq!(ev.grace_ms, Some(50));
            saw_timeout = true;
        }
    }
    assert!(saw_timeout);
}

#[tokio::test]
async fn every_item_is_processed_exactly_once_across_consumers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cb: CallbackRef<u32> = {
        let seen = seen.clone();
        CallbackFn::arc("collect", move |n: u32| {
            let seen = seen.clone();
            async move {
                tokio::task::yield_now().await;
                seen.lock().unwrap().push(n);
                Ok(())
            }
        })
    };
    let cfg = ChannelConfig {
        capacity: 8,
        consumers: 4,
        kind: ConsumerKind::Supervised,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, cb);
    channel.start().unwrap();

    let senders: Vec<_> = (0..2u32)
        .map(|p| {
            let producer = channel.producer();
            tokio::spawn(async move {
                for i in 0..100 {
                    producer.send(p * 100 + i).await.unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        time::timeout(WAIT, sender).await.unwrap().unwrap();
    }
    time::timeout(WAIT, channel.drain()).await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 200);
    let unique: BTreeSet<u32> = seen.into_iter().collect();
    assert_eq!(unique, (0..200).collect());
    assert_eq!(total(&channel).delivered, 200);

    channel.stop().await;
}

#[tokio::test]
async fn shutdown_drains_then_rejects_new_items() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cfg = ChannelConfig {
        name: "drain".into(),
        consumers: 2,
        kind: ConsumerKind::Supervised,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, recording(seen.clone()));

    for item in ["a", "b", "c", "d"] {
        channel.send(item).await.unwrap();
    }
    channel.start().unwrap();

    let report = time::timeout(WAIT, channel.shutdown()).await.unwrap();
    assert!(report.is_graceful());
    assert_eq!(seen.lock().unwrap().len(), 4);
    assert_eq!(channel.size(), 0);

    let rejected = channel.try_send("late").unwrap_err();
    assert_eq!(rejected.error(), QueueError::Closed);
}

#[tokio::test]
async fn start_twice_is_rejected_and_restart_after_stop_works() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let channel = Channel::new(ChannelConfig::default(), recording(seen.clone()));
    let mut events = channel.events();

    channel.run().unwrap();
    assert!(channel.start().is_err());

    let mut started = false;
    while let Ok(Ok(ev)) = time::timeout(Duration::from_millis(100), events.recv()).await {
        if ev.kind == EventKind::ChannelStarted {
            assert_eq!(ev.consumer.as_deref(), Some("channel"));
            started = true;
            break;
        }
    }
    assert!(started);

    channel.stop().await;
    channel.start().unwrap();
    channel.send("again").await.unwrap();
    eventually(|| seen.lock().unwrap().len() == 1).await;
    channel.stop().await;
}

#[tokio::test]
async fn failing_item_logs_exactly_one_error() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::ERROR)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let cb: CallbackRef<&'static str> = CallbackFn::arc("second-fails", |item: &'static str| async move {
        if item == "b" {
            return Err(CallbackError::fail("bad item"));
        }
        Ok(())
    });
    let cfg = ChannelConfig {
        kind: ConsumerKind::Supervised,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, cb);
    channel.start().unwrap();
    for item in ["a", "b", "c"] {
        channel.send(item).await.unwrap();
    }
    time::timeout(WAIT, channel.drain()).await.unwrap();
    channel.stop().await;

    assert_eq!(total(&channel).delivered, 3);
    let errors: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("ERROR"))
        .collect();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("item processing failed"));
    assert!(errors[0].contains("bad item"));
}

#[tokio::test]
async fn start_skips_consumers_already_running() {
    let cfg = ChannelConfig {
        consumers: 3,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, recording(Arc::default()));
    let mut events = channel.events();

    channel.consumers()[1].start().unwrap();
    channel.start().unwrap();
    for consumer in channel.consumers() {
        assert_eq!(consumer.state(), ConsumerState::Running);
    }

    let mut started = false;
    while let Ok(ev) = events.try_recv() {
        started |= ev.kind == EventKind::ChannelStarted;
    }
    assert!(started);

    let report = channel.stop().await;
    assert_eq!(report.stopped.len(), 3);
}

#[tokio::test]
async fn events_published_before_drop_reach_subscribers() {
    let kinds = Arc::new(Kinds::default());
    let channel = Channel::<&'static str>::builder(ChannelConfig::default())
        .with_subscriber(kinds.clone())
        .build(recording(Arc::default()));

    channel.start().unwrap();
    channel.stop().await;
    drop(channel);

    eventually(|| {
        kinds
            .0
            .lock()
            .unwrap()
            .contains(&EventKind::ChannelStopped)
    })
    .await;
}

#[tokio::test]
async fn start_reports_consumer_still_stopping() {
    let cb: CallbackRef<u32> = CallbackFn::arc("hang", |_n: u32| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let cfg = ChannelConfig {
        name: "busy".into(),
        consumers: 2,
        grace: Duration::from_millis(50),
        ..ChannelConfig::default()
    };
    let channel = Channel::new(cfg, cb);
    channel.start().unwrap();
    channel.send(1).await.unwrap();
    eventually(|| total(&channel).delivered == 1).await;

    let stuck = channel
        .consumers()
        .iter()
        .find(|c| c.stats().delivered == 1)
        .unwrap()
        .clone();
    assert!(stuck.request_stop());

    let err = channel.start().unwrap_err();
    assert_eq!(err.as_label(), "consumer_stopping");
    assert_eq!(stuck.state(), ConsumerState::Stopping);

    let report = time::timeout(WAIT, channel.stop()).await.unwrap();
    assert_eq!(report.forced, vec![stuck.name().to_string()]);
}
