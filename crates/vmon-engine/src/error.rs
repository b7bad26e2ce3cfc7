//! The executor's closed set of error codes.
//!
//! These cross the dispatch/queue API boundary verbatim, the same way the
//! original C executor returned a small set of negative `int` codes.

/// Error codes returned by [`crate::queue::TaskQueue::put`] and
/// [`crate::executor::Executor::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// `dispatch` was called before `start` or after `stop`.
    #[error("executor is not running")]
    NotRunning,
    /// `start` was called on an already-running executor.
    #[error("executor already started")]
    AlreadyStarted,
    /// The task queue is at capacity.
    #[error("too many tasks queued")]
    TooManyTasks,
    /// The declared payload length exceeds the embedded capacity.
    #[error("payload too large for embedded capacity")]
    TooMuchData,
}

impl ExecutorError {
    /// The verbatim integer code carried across the original API boundary.
    pub const fn code(self) -> i32 {
        match self {
            ExecutorError::NotRunning => -1,
            ExecutorError::AlreadyStarted => -2,
            ExecutorError::TooManyTasks => -3,
            ExecutorError::TooMuchData => -4,
        }
    }
}
