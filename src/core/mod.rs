//! Runtime core: consumers, producers and the channel that owns them.
//!
//! Internal modules:
//! - [`state`]: consumer state machine, kind and counters;
//! - [`runner`]: runs the callback for one item with failure isolation and event publishing;
//! - [`consumer`]: background consume loop with cooperative/forced stop;
//! - [`producer`]: enqueue handle;
//! - [`channel`]: composition root and joint lifecycle;
//! - [`builder`]: channel construction with subscribers;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod channel;
mod consumer;
mod producer;
mod runner;
mod shutdown;
mod state;

pub use builder::ChannelBuilder;
pub use channel::{Channel, StopReport};
pub use consumer::{Consumer, DEFAULT_GRACE, StopOutcome};
pub use producer::Producer;
pub use state::{ConsumerKind, ConsumerState, ConsumerStats};

pub(crate) use runner::panic_message;
