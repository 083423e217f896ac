// Lane diagnostics
//
// Routes scheduler events to a sink. Slow-wait warnings and task errors each
// pass through their own dedup gate; failures on quiet lanes are dropped.

pub mod dedup;
pub mod sink;

pub use dedup::{DedupGate, EmitDecision};
pub use sink::{DiagnosticSink, LaneEvent, RecordingSink, TracingSink};

use crate::lanes::matches_any_prefix;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a task error to the signature used for dedup.
pub type ErrorFingerprint = Arc<dyn Fn(&dyn fmt::Display) -> String + Send + Sync>;

/// Fingerprint by `Display` output.
pub fn display_fingerprint() -> ErrorFingerprint {
    Arc::new(|err: &dyn fmt::Display| err.to_string())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Everything the scheduler reports goes through here.
pub struct LaneDiagnostics {
    sink: Arc<dyn DiagnosticSink>,
    wait_gate: DedupGate,
    error_gate: DedupGate,
    quiet_lane_prefixes: Vec<String>,
    fingerprint: ErrorFingerprint,
}

impl LaneDiagnostics {
    pub fn new(
        sink: Arc<dyn DiagnosticSink>,
        wait_window: Duration,
        error_window: Duration,
        quiet_lane_prefixes: Vec<String>,
        fingerprint: ErrorFingerprint,
    ) -> Self {
        Self {
            sink,
            wait_gate: DedupGate::new(wait_window),
            error_gate: DedupGate::new(error_window),
            quiet_lane_prefixes,
            fingerprint,
        }
    }

    pub fn fingerprint(&self) -> &ErrorFingerprint {
        &self.fingerprint
    }

    /// Whether failures on `lane` are expected and never logged.
    pub fn is_quiet_lane(&self, lane: &str) -> bool {
        matches_any_prefix(lane, &self.quiet_lane_prefixes)
    }

    pub fn enqueued(&self, lane: &str, queue_size: usize) {
        self.sink.record(&LaneEvent::Enqueued {
            lane: lane.to_string(),
            queue_size,
        });
    }

    pub fn dequeued(&self, lane: &str, waited: Duration, queue_ahead: usize) {
        self.sink.record(&LaneEvent::Dequeued {
            lane: lane.to_string(),
            waited_ms: millis(waited),
            queue_ahead,
        });
    }

    /// Slow admission, deduped on the number of entries still queued.
    pub fn wait_exceeded(&self, lane: &str, waited: Duration, queue_ahead: usize) {
        let signature = format!("queueAhead={}", queue_ahead);
        let decision = self.wait_gate.should_emit(lane, &signature);
        if !decision.emit {
            return;
        }
        if decision.suppressed_before_emit > 0 {
            self.sink.record(&LaneEvent::WaitSuppressed {
                lane: lane.to_string(),
                suppressed: decision.suppressed_before_emit,
                window_ms: millis(self.wait_gate.window()),
            });
        }
        self.sink.record(&LaneEvent::WaitExceeded {
            lane: lane.to_string(),
            waited_ms: millis(waited),
            queue_ahead,
        });
    }

    pub fn task_done(&self, lane: &str, duration: Duration, active: usize, queued: usize) {
        self.sink.record(&LaneEvent::TaskDone {
            lane: lane.to_string(),
            duration_ms: millis(duration),
            active,
            queued,
        });
    }

    /// Task failure, deduped on `signature`. Quiet lanes never log.
    pub fn task_failed(&self, lane: &str, duration: Duration, error: &str, signature: &str) {
        if self.is_quiet_lane(lane) {
            return;
        }
        let decision = self.error_gate.should_emit(lane, signature);
        if !decision.emit {
            return;
        }
        if decision.suppressed_before_emit > 0 {
            self.sink.record(&LaneEvent::TaskErrorSuppressed {
                lane: lane.to_string(),
                suppressed: decision.suppressed_before_emit,
                window_ms: millis(self.error_gate.window()),
            });
        }
        self.sink.record(&LaneEvent::TaskError {
            lane: lane.to_string(),
            duration_ms: millis(duration),
            error: error.to_string(),
        });
    }
}

impl fmt::Debug for LaneDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneDiagnostics")
            .field("wait_gate", &self.wait_gate)
            .field("error_gate", &self.error_gate)
            .field("quiet_lane_prefixes", &self.quiet_lane_prefixes)
            .finish_non_exhaustive()
    }
}
