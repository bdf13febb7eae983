//! # Invoke a callback for one item.
//!
//! Runs the callback once, isolates failures, and reports them.
//!
//! ## Flow
//! ```text
//! Success:
//!   callback.call(item) → Ok(())  → return Ok
//!
//! Failure:
//!   callback.call(item) → Err(e)  → error! log → publish CallbackFailed → return Err
//!
//! Panic:
//!   callback.call(item) → panic   → catch_unwind → error! log → publish CallbackPanicked
//!                                 → return Err(Panicked)
//! ```
//!
//! ## Rules
//! - Never propagates a panic; the consumer loop always continues.
//! - Publishes **at most one** failure event per item.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::{
    callbacks::Callback,
    error::CallbackError,
    events::{Bus, Event, EventKind},
};

/// Invokes `callback` with `item` on behalf of `consumer`.
pub(crate) async fn invoke<T: Send + 'static>(
    callback: &dyn Callback<T>,
    consumer: &str,
    item: T,
    bus: &Bus,
) -> Result<(), CallbackError> {
    let res = match AssertUnwindSafe(callback.call(item)).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(CallbackError::Panicked {
            info: panic_message(&panic),
        }),
    };

    if let Err(e) = &res {
        tracing::error!(
            consumer,
            callback = callback.name(),
            label = e.as_label(),
            error = %e,
            "item processing failed; continuing with next item"
        );
        let kind = match e {
            CallbackError::Panicked { .. } => EventKind::CallbackPanicked,
            _ => EventKind::CallbackFailed,
        };
        bus.publish(
            Event::new(kind)
                .with_consumer(consumer)
                .with_reason(e.as_message()),
        );
    }
    res
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackFn, CallbackRef};

    #[tokio::test]
    async fn test_failure_is_published() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let cb: CallbackRef<u32> =
            CallbackFn::arc("failing", |n: u32| async move { Err(CallbackError::fail(n)) });

        let res = invoke(cb.as_ref(), "c-0", 42, &bus).await;
        assert_eq!(res, Err(CallbackError::fail("42")));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::CallbackFailed);
        assert_eq!(ev.consumer.as_deref(), Some("c-0"));
        assert_eq!(ev.reason.as_deref(), Some("error: 42"));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let cb: CallbackRef<u32> = CallbackFn::arc("panicking", |n: u32| async move {
            if n > 0 {
                panic!("bad item {n}");
            }
            Ok(())
        });

        let res = invoke(cb.as_ref(), "c-0", 7, &bus).await;
        assert_eq!(
            res,
            Err(CallbackError::Panicked {
                info: "bad item 7".into()
            })
        );
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::CallbackPanicked);
    }

    #[tokio::test]
    async fn test_success_publishes_nothing() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let cb: CallbackRef<u32> = CallbackFn::arc("ok", |_n: u32| async { Ok(()) });

        assert!(invoke(cb.as_ref(), "c-0", 1, &bus).await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let o: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let u: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(&s), "static");
        assert_eq!(panic_message(&o), "owned");
        assert_eq!(panic_message(&u), "unknown panic");
    }
}
