#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! The bounded, timeout-enforcing task execution engine (TaskQueue,
//! Scheduler, Worker, Executor) that drives sampling.

/// Error type returned by the executor.
pub mod error;
/// The worker-pool executor itself.
pub mod executor;
/// The bounded task queue workers pull from.
pub mod queue;
/// The deadline-ordered timer scheduler.
pub mod scheduler;
mod worker;

pub use error::ExecutorError;
pub use executor::{Executor, EMBED_CAPACITY};
pub use queue::{QueueFull, TaskQueue};
pub use scheduler::{Scheduler, TimerId};
