//! # Consumer state machine, kind and counters.
//!
//! ```text
//!            start()                 stop() / request_stop()
//!   Idle ─────────────► Running ─────────────────────────► Stopping
//!                         │                                   │
//!                         │ queue closed / abort()            │ loop exits / grace exceeded → abort
//!                         ▼                                   ▼
//!                       Stopped ◄─────────────────────────────┘
//!                         │
//!                         └── start() again → Running (next generation)
//! ```
//!
//! The state and a run *generation* share one atomic word, so a loop that exits
//! late (e.g. an aborted task being dropped) can never mark a newer run as stopped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a [`Consumer`](crate::Consumer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, never started.
    Idle,
    /// Background loop is dequeuing.
    Running,
    /// Stop requested; the loop exits before its next dequeue.
    Stopping,
    /// Loop has exited. The consumer may be started again.
    Stopped,
}

impl ConsumerState {
    fn to_bits(self) -> u64 {
        match self {
            ConsumerState::Idle => 0,
            ConsumerState::Running => 1,
            ConsumerState::Stopping => 2,
            ConsumerState::Stopped => 3,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            0 => ConsumerState::Idle,
            1 => ConsumerState::Running,
            2 => ConsumerState::Stopping,
            _ => ConsumerState::Stopped,
        }
    }
}

/// How a consumer acknowledges the items it takes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsumerKind {
    /// Items count as finished as soon as they are dequeued.
    #[default]
    Plain,
    /// Items count as finished only after the callback returned (or failed).
    Supervised,
}

const STATE_MASK: u64 = 0xff;
const GEN_SHIFT: u32 = 8;

/// Packed `(generation, state)` cell.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU64);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(ConsumerState::Idle.to_bits()))
    }

    pub(crate) fn load(&self) -> ConsumerState {
        ConsumerState::from_bits(self.0.load(Ordering::Acquire))
    }

    /// `Idle | Stopped → Running`, bumping the generation.
    ///
    /// Returns the new generation, or the state that prevented the transition.
    pub(crate) fn begin_run(&self) -> Result<u64, ConsumerState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                match ConsumerState::from_bits(bits) {
                    ConsumerState::Idle | ConsumerState::Stopped => {
                        let generation = (bits >> GEN_SHIFT) + 1;
                        Some(pack(generation, ConsumerState::Running))
                    }
                    _ => None,
                }
            })
            .map(|prev| (prev >> GEN_SHIFT) + 1)
            .map_err(ConsumerState::from_bits)
    }

    /// `Running → Stopping`; returns whether the transition happened.
    pub(crate) fn request_stop(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (ConsumerState::from_bits(bits) == ConsumerState::Running)
                    .then(|| pack(bits >> GEN_SHIFT, ConsumerState::Stopping))
            })
            .is_ok()
    }

    /// Marks run `generation` as stopped; no-op if a newer run exists.
    pub(crate) fn finish(&self, generation: u64) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (bits >> GEN_SHIFT == generation)
                    .then(|| pack(generation, ConsumerState::Stopped))
            })
            .is_ok()
    }
}

fn pack(generation: u64, state: ConsumerState) -> u64 {
    (generation << GEN_SHIFT) | state.to_bits()
}

/// Point-in-time counters of a consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Items taken from the queue.
    pub delivered: u64,
    /// Callback calls that returned `Ok`.
    pub succeeded: u64,
    /// Callback calls that returned `Err` or panicked.
    pub failed: u64,
    /// Items acknowledged by this consumer.
    pub acked: u64,
}

/// Live counters behind [`ConsumerStats`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) delivered: AtomicU64,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) acked: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
        }
    }
}
