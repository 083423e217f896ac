// Dedup log gate
//
// Per-lane record of the last emitted event for one concern. Identical events
// inside the window are counted instead of logged; the count is handed back on
// the next emission so the caller can report it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Last emission for a lane
#[derive(Debug, Clone)]
struct LogRecord {
    signature: String,
    last_emitted_at: Instant,
    suppressed: u64,
}

/// Outcome of a dedup check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitDecision {
    /// Whether the event should reach the sink
    pub emit: bool,
    /// Occurrences withheld since the previous emission (0 unless `emit`)
    pub suppressed_before_emit: u64,
}

/// Suppresses repeats of the same signature per lane within a window.
#[derive(Debug)]
pub struct DedupGate {
    window: Duration,
    records: DashMap<String, LogRecord>,
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn should_emit(&self, lane: &str, signature: &str) -> EmitDecision {
        self.should_emit_at(lane, signature, Instant::now())
    }

    /// Decide against an explicit clock reading.
    ///
    /// Emits when the lane has no record, the signature changed, or strictly
    /// more than `window` has passed since the last emission.
    pub fn should_emit_at(&self, lane: &str, signature: &str, now: Instant) -> EmitDecision {
        let mut record = match self.records.entry(lane.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(LogRecord {
                    signature: signature.to_string(),
                    last_emitted_at: now,
                    suppressed: 0,
                });
                return EmitDecision {
                    emit: true,
                    suppressed_before_emit: 0,
                };
            }
            Entry::Occupied(slot) => slot.into_ref(),
        };

        let changed = record.signature != signature;
        let expired = now.saturating_duration_since(record.last_emitted_at) > self.window;

        if changed || expired {
            let suppressed_before_emit = record.suppressed;
            record.signature = signature.to_string();
            record.last_emitted_at = now;
            record.suppressed = 0;
            return EmitDecision {
                emit: true,
                suppressed_before_emit,
            };
        }

        record.suppressed += 1;
        EmitDecision {
            emit: false,
            suppressed_before_emit: 0,
        }
    }

    /// Number of lanes with a record.
    pub fn tracked_lanes(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DedupGate {
        DedupGate::new(Duration::from_secs(30))
    }

    #[test]
    fn test_first_event_emits() {
        let gate = gate();
        let now = Instant::now();
        let decision = gate.should_emit_at("main", "queueAhead=3", now);
        assert_eq!(
            decision,
            EmitDecision {
                emit: true,
                suppressed_before_emit: 0
            }
        );
        assert_eq!(gate.tracked_lanes(), 1);
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_emit_at("main", "boom", t0).emit);
        assert!(!gate.should_emit_at("main", "boom", t0 + Duration::from_secs(1)).emit);
        assert!(!gate.should_emit_at("main", "boom", t0 + Duration::from_secs(2)).emit);

        // A different signature emits and reports the two withheld repeats
        let decision = gate.should_emit_at("main", "other", t0 + Duration::from_secs(3));
        assert!(decision.emit);
        assert_eq!(decision.suppressed_before_emit, 2);
    }

    #[test]
    fn test_window_expiry_emits_again() {
        let gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_emit_at("main", "boom", t0).emit);
        assert!(!gate.should_emit_at("main", "boom", t0 + Duration::from_secs(10)).emit);

        // Exactly at the window edge is still inside it
        assert!(!gate.should_emit_at("main", "boom", t0 + Duration::from_secs(30)).emit);

        let decision = gate.should_emit_at("main", "boom", t0 + Duration::from_millis(30_001));
        assert!(decision.emit);
        assert_eq!(decision.suppressed_before_emit, 2);
    }

    #[test]
    fn test_lanes_are_independent() {
        let gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_emit_at("a", "boom", t0).emit);
        assert!(gate.should_emit_at("b", "boom", t0).emit);
        assert!(!gate.should_emit_at("a", "boom", t0).emit);
        assert_eq!(gate.tracked_lanes(), 2);
    }

    #[test]
    fn test_counter_resets_after_emission() {
        let gate = gate();
        let t0 = Instant::now();
        gate.should_emit_at("main", "x", t0);
        gate.should_emit_at("main", "x", t0);
        assert_eq!(gate.should_emit_at("main", "y", t0).suppressed_before_emit, 1);
        assert_eq!(gate.should_emit_at("main", "x", t0).suppressed_before_emit, 0);
    }
}
