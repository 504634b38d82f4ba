//! The queue handle and its blocking consumer.

mod poller;
#[allow(clippy::module_inception)]
mod queue;

pub use queue::{Queue, QueueBuilder};
