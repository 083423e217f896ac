// Scheduler errors surfaced through a task's own error type

use thiserror::Error;

/// Outcomes the scheduler itself can produce for an enqueued task.
///
/// Callers never see these wrapped around their own errors: the task's error
/// type converts from `QueueError`, so a failing task's error arrives as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The entry was discarded before admission (`clear_lane` or queue shutdown).
    #[error("lane '{lane}' was cleared before the task started")]
    Cleared { lane: String },

    /// The task panicked while running.
    #[error("task in lane '{lane}' panicked")]
    TaskPanicked { lane: String },
}

impl QueueError {
    pub fn lane(&self) -> &str {
        match self {
            QueueError::Cleared { lane } | QueueError::TaskPanicked { lane } => lane,
        }
    }
}
