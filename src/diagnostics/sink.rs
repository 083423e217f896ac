// Diagnostic events and the sink that receives them

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A scheduler diagnostic, already past any dedup gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneEvent {
    /// Entry appended; `queue_size` counts pending + active after the append
    Enqueued { lane: String, queue_size: usize },
    /// Entry admitted after waiting `waited_ms`
    Dequeued {
        lane: String,
        waited_ms: u64,
        queue_ahead: usize,
    },
    WaitExceeded {
        lane: String,
        waited_ms: u64,
        queue_ahead: usize,
    },
    /// Wait warnings withheld inside the dedup window
    WaitSuppressed {
        lane: String,
        suppressed: u64,
        window_ms: u64,
    },
    TaskDone {
        lane: String,
        duration_ms: u64,
        active: usize,
        queued: usize,
    },
    TaskError {
        lane: String,
        duration_ms: u64,
        error: String,
    },
    /// Task errors withheld inside the dedup window
    TaskErrorSuppressed {
        lane: String,
        suppressed: u64,
        window_ms: u64,
    },
}

impl LaneEvent {
    pub fn lane(&self) -> &str {
        match self {
            LaneEvent::Enqueued { lane, .. }
            | LaneEvent::Dequeued { lane, .. }
            | LaneEvent::WaitExceeded { lane, .. }
            | LaneEvent::WaitSuppressed { lane, .. }
            | LaneEvent::TaskDone { lane, .. }
            | LaneEvent::TaskError { lane, .. }
            | LaneEvent::TaskErrorSuppressed { lane, .. } => lane,
        }
    }
}

impl fmt::Display for LaneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneEvent::Enqueued { lane, queue_size } => {
                write!(f, "lane enqueue: lane={} queueSize={}", lane, queue_size)
            }
            LaneEvent::Dequeued {
                lane,
                waited_ms,
                queue_ahead,
            } => write!(
                f,
                "lane dequeue: lane={} waitMs={} queueAhead={}",
                lane, waited_ms, queue_ahead
            ),
            LaneEvent::WaitExceeded {
                lane,
                waited_ms,
                queue_ahead,
            } => write!(
                f,
                "lane wait exceeded: lane={} waitedMs={} queueAhead={}",
                lane, waited_ms, queue_ahead
            ),
            LaneEvent::WaitSuppressed {
                lane,
                suppressed,
                window_ms,
            } => write!(
                f,
                "lane wait exceeded (deduped): lane={} suppressed={} windowMs={}",
                lane, suppressed, window_ms
            ),
            LaneEvent::TaskDone {
                lane,
                duration_ms,
                active,
                queued,
            } => write!(
                f,
                "lane task done: lane={} durationMs={} active={} queued={}",
                lane, duration_ms, active, queued
            ),
            LaneEvent::TaskError {
                lane,
                duration_ms,
                error,
            } => write!(
                f,
                "lane task error: lane={} durationMs={} error=\"{}\"",
                lane, duration_ms, error
            ),
            LaneEvent::TaskErrorSuppressed {
                lane,
                suppressed,
                window_ms,
            } => write!(
                f,
                "lane task error (deduped): lane={} suppressed={} windowMs={}",
                lane, suppressed, window_ms
            ),
        }
    }
}

/// Receiver for scheduler diagnostics.
///
/// Implementations must not block; they are called from lane workers and
/// task completion paths.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &LaneEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &LaneEvent) {
        match event {
            LaneEvent::Enqueued { lane, queue_size } => {
                tracing::debug!(lane = %lane, queue_size, "{}", event);
            }
            LaneEvent::Dequeued {
                lane,
                waited_ms,
                queue_ahead,
            } => {
                tracing::debug!(lane = %lane, waited_ms, queue_ahead, "{}", event);
            }
            LaneEvent::WaitExceeded {
                lane,
                waited_ms,
                queue_ahead,
            } => {
                tracing::warn!(lane = %lane, waited_ms, queue_ahead, "{}", event);
            }
            LaneEvent::WaitSuppressed {
                lane,
                suppressed,
                window_ms,
            }
            | LaneEvent::TaskErrorSuppressed {
                lane,
                suppressed,
                window_ms,
            } => {
                tracing::warn!(lane = %lane, suppressed, window_ms, "{}", event);
            }
            LaneEvent::TaskDone {
                lane,
                duration_ms,
                active,
                queued,
            } => {
                tracing::debug!(lane = %lane, duration_ms, active, queued, "{}", event);
            }
            LaneEvent::TaskError {
                lane,
                duration_ms,
                error,
            } => {
                tracing::error!(lane = %lane, duration_ms, error = %error, "{}", event);
            }
        }
    }
}

/// Keeps every event in memory. Useful in tests and for embedding callers
/// that surface diagnostics themselves.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<LaneEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LaneEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events matching `pred`, in arrival order.
    pub fn filtered(&self, pred: impl Fn(&LaneEvent) -> bool) -> Vec<LaneEvent> {
        self.events().into_iter().filter(|e| pred(e)).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: &LaneEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
