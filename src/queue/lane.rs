// Lane state and the per-lane worker
//
// Each lane owns a FIFO of pending entries and a single worker task. The
// worker admits entries while the lane is under its concurrency limit, spawns
// each admitted job, then parks until a settlement or a new entry wakes it.

use super::entry::QueueEntry;
use crate::diagnostics::LaneDiagnostics;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Point-in-time view of a lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    pub lane: String,
    /// Entries waiting for admission
    pub queued: usize,
    /// Entries currently running
    pub active: usize,
    pub max_concurrent: usize,
    /// Settled tasks that succeeded
    pub completed: u64,
    /// Settled tasks that failed or panicked
    pub failed: u64,
}

impl LaneSnapshot {
    /// Pending + active, the lane's queue size.
    pub fn size(&self) -> usize {
        self.queued + self.active
    }
}

struct LaneState {
    pending: VecDeque<QueueEntry>,
    active: usize,
    max_concurrent: usize,
    /// Worker task, respawned when its runtime has gone away
    worker: Option<JoinHandle<()>>,
    closed: bool,
    completed: u64,
    failed: u64,
}

/// An entry taken off the queue, ready to launch
struct Admission {
    entry: QueueEntry,
    waited: Duration,
    queue_ahead: usize,
}

pub(crate) struct Lane {
    name: String,
    state: Mutex<LaneState>,
    wake: Notify,
}

impl Lane {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(LaneState {
                pending: VecDeque::new(),
                active: 0,
                max_concurrent: 1,
                worker: None,
                closed: false,
                completed: 0,
                failed: 0,
            }),
            wake: Notify::new(),
        }
    }

    // Bookkeeping never awaits while holding the lock, and a panicking
    // task cannot poison it (tasks run outside it).
    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry; returns pending + active afterwards.
    pub fn push(&self, entry: QueueEntry) -> usize {
        let mut state = self.lock();
        state.pending.push_back(entry);
        state.pending.len() + state.active
    }

    /// Set the concurrency limit, clamped to at least 1.
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> usize {
        let mut state = self.lock();
        state.max_concurrent = max_concurrent.max(1);
        state.max_concurrent
    }

    pub fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }

    pub fn size(&self) -> usize {
        let state = self.lock();
        state.pending.len() + state.active
    }

    /// Drop all pending entries. Their futures resolve as cleared.
    pub fn clear(&self) -> usize {
        let removed: Vec<QueueEntry> = self.lock().pending.drain(..).collect();
        removed.len()
    }

    /// Stop the worker and discard pending entries. Running tasks finish.
    pub fn close(&self) {
        let removed: Vec<QueueEntry> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain(..).collect()
        };
        drop(removed);
        self.wake.notify_one();
    }

    pub fn snapshot(&self) -> LaneSnapshot {
        let state = self.lock();
        LaneSnapshot {
            lane: self.name.clone(),
            queued: state.pending.len(),
            active: state.active,
            max_concurrent: state.max_concurrent,
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Wake the worker, starting it if it is not running.
    ///
    /// A worker whose runtime shut down is replaced on the current runtime.
    /// Outside a runtime nothing starts; the entry's `LaneFuture` signals
    /// again when it is first polled.
    pub fn signal(self: &Arc<Self>, diagnostics: &Arc<LaneDiagnostics>) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let running = state
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished());
            if !running {
                match Handle::try_current() {
                    Ok(handle) => {
                        if state.worker.is_some() {
                            tracing::debug!(lane = %self.name, "Lane worker gone, respawning");
                        }
                        state.worker =
                            Some(handle.spawn(run_worker(Arc::clone(self), Arc::clone(diagnostics))));
                    }
                    Err(_) => {
                        if !state.pending.is_empty() {
                            tracing::debug!(
                                lane = %self.name,
                                "No Tokio runtime; lane worker starts when the task is awaited"
                            );
                        }
                        return;
                    }
                }
            }
        }
        self.wake.notify_one();
    }

    /// Pop every entry the limit allows. `None` once the lane is closed.
    fn take_admissible(&self) -> Option<Vec<Admission>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }

        let now = Instant::now();
        let mut admitted = Vec::new();
        while state.active < state.max_concurrent {
            let Some(entry) = state.pending.pop_front() else {
                break;
            };
            state.active += 1;
            admitted.push(Admission {
                waited: now.saturating_duration_since(entry.enqueued_at),
                queue_ahead: state.pending.len(),
                entry,
            });
        }
        Some(admitted)
    }

    /// Record a settlement; returns (active, queued) afterwards.
    fn finish(&self, succeeded: bool) -> (usize, usize) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        if succeeded {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
        (state.active, state.pending.len())
    }
}

async fn run_worker(lane: Arc<Lane>, diagnostics: Arc<LaneDiagnostics>) {
    tracing::debug!(lane = %lane.name, "Lane worker started");

    while let Some(admitted) = lane.take_admissible() {
        for admission in admitted {
            launch(&lane, &diagnostics, admission);
        }
        // notify_one keeps a permit, so wakeups sent while admitting are not lost
        lane.wake.notified().await;
    }

    tracing::debug!(lane = %lane.name, "Lane worker stopped");
}

/// An admitted entry's hold on a concurrency slot.
///
/// If the task is dropped before settling (its runtime shut down), the slot
/// is handed back so the lane keeps admitting.
struct ActiveSlot {
    lane: Arc<Lane>,
    released: bool,
}

impl ActiveSlot {
    fn release(&mut self, succeeded: bool) -> (usize, usize) {
        self.released = true;
        self.lane.finish(succeeded)
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        if !self.released {
            self.lane.finish(false);
            tracing::warn!(lane = %self.lane.name, "Lane task dropped before it settled");
            self.lane.wake.notify_one();
        }
    }
}

fn launch(lane: &Arc<Lane>, diagnostics: &Arc<LaneDiagnostics>, admission: Admission) {
    let Admission {
        entry,
        waited,
        queue_ahead,
    } = admission;

    if waited >= entry.warn_after {
        if let Some(on_wait) = entry.on_wait {
            if catch_unwind(AssertUnwindSafe(|| on_wait(waited, queue_ahead))).is_err() {
                tracing::warn!(lane = %lane.name, "on_wait observer panicked");
            }
        }
        diagnostics.wait_exceeded(&lane.name, waited, queue_ahead);
    }
    diagnostics.dequeued(&lane.name, waited, queue_ahead);

    let mut slot = ActiveSlot {
        lane: Arc::clone(lane),
        released: false,
    };
    let diagnostics = Arc::clone(diagnostics);
    let job = entry.job;
    tokio::spawn(async move {
        let started = Instant::now();
        let settlement = job().await;
        let duration = started.elapsed();

        let (active, queued) = slot.release(settlement.failure.is_none());
        let lane = &slot.lane;
        diagnostics.task_done(&lane.name, duration, active, queued);
        if let Some(failure) = &settlement.failure {
            diagnostics.task_failed(&lane.name, duration, &failure.error, &failure.signature);
        }

        lane.wake.notify_one();
        settlement.deliver();
    });
}

/// Restarts a lane's worker from a `LaneFuture` poll, where a runtime is
/// guaranteed.
pub(crate) struct WorkerStarter {
    lane: Arc<Lane>,
    diagnostics: Arc<LaneDiagnostics>,
}

impl WorkerStarter {
    pub fn new(lane: Arc<Lane>, diagnostics: Arc<LaneDiagnostics>) -> Self {
        Self { lane, diagnostics }
    }

    pub fn start(self) {
        self.lane.signal(&self.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{display_fingerprint, RecordingSink};
    use crate::queue::entry::erase;
    use tokio::sync::oneshot;

    fn entry(lane: &str) -> (QueueEntry, oneshot::Receiver<anyhow::Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let job = erase(lane.to_string(), || async { Ok(()) }, tx, display_fingerprint());
        (
            QueueEntry {
                job,
                enqueued_at: Instant::now(),
                warn_after: Duration::from_secs(2),
                on_wait: None,
            },
            rx,
        )
    }

    #[test]
    fn test_new_lane_is_serial_and_empty() {
        let lane = Lane::new("main");
        assert_eq!(lane.name, "main");
        assert_eq!(lane.max_concurrent(), 1);
        assert_eq!(lane.size(), 0);
    }

    #[test]
    fn test_concurrency_clamped_to_one() {
        let lane = Lane::new("main");
        assert_eq!(lane.set_max_concurrent(0), 1);
        assert_eq!(lane.set_max_concurrent(4), 4);
    }

    #[tokio::test]
    async fn test_take_admissible_respects_limit_and_fifo() {
        let lane = Lane::new("main");
        lane.set_max_concurrent(2);
        for _ in 0..3 {
            lane.push(entry("main").0);
        }

        let admitted = lane.take_admissible().unwrap();
        assert_eq!(admitted.len(), 2);
        assert_eq!(admitted[0].queue_ahead, 2);
        assert_eq!(admitted[1].queue_ahead, 1);
        assert_eq!(lane.size(), 3);
        assert!(lane.take_admissible().unwrap().is_empty());

        assert_eq!(lane.finish(true), (1, 1));
        assert_eq!(lane.take_admissible().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_pending_only() {
        let lane = Lane::new("main");
        let (first, _rx1) = entry("main");
        let (second, rx2) = entry("main");
        lane.push(first);
        lane.push(second);
        let _running = lane.take_admissible().unwrap();

        assert_eq!(lane.clear(), 1);
        assert_eq!(lane.size(), 1);
        // The cleared entry's sender is gone
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn test_closed_lane_stops_admitting() {
        let lane = Lane::new("main");
        lane.push(entry("main").0);
        lane.close();
        assert!(lane.take_admissible().is_none());
        assert_eq!(lane.size(), 0);
    }

    #[tokio::test]
    async fn test_signal_starts_worker_and_runs_entry() {
        let sink = RecordingSink::new();
        let diagnostics = Arc::new(LaneDiagnostics::new(
            Arc::new(sink.clone()),
            Duration::from_secs(30),
            Duration::from_secs(30),
            Vec::new(),
            display_fingerprint(),
        ));
        let lane = Arc::new(Lane::new("main"));
        let (e, rx) = entry("main");
        lane.push(e);
        lane.signal(&diagnostics);

        rx.await.unwrap().unwrap();
        let snapshot = lane.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.size(), 0);
    }
}
