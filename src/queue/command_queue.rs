// Command queue: the public scheduler API
//
// Owns the lane registry. Lanes are created on first use and live as long as
// the queue; dropping the last handle stops every lane worker.

use super::entry::{erase, EnqueueOptions, LaneFuture, QueueEntry};
use super::error::QueueError;
use super::lane::{Lane, LaneSnapshot, WorkerStarter};
use crate::config::QueueConfig;
use crate::diagnostics::{
    display_fingerprint, DiagnosticSink, ErrorFingerprint, LaneDiagnostics, TracingSink,
};
use crate::lanes::{resolve_lane_name, CommandLane};
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Lane-based command scheduler. Clone freely (it's an Arc inside).
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    lanes: DashMap<String, Arc<Lane>>,
    diagnostics: Arc<LaneDiagnostics>,
    default_warn_after: Duration,
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        for lane in self.lanes.iter() {
            lane.close();
        }
    }
}

impl CommandQueue {
    /// Queue with default settings, logging through `tracing`.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> CommandQueueBuilder {
        CommandQueueBuilder::default()
    }

    fn lane(&self, name: &str) -> Option<Arc<Lane>> {
        self.inner.lanes.get(name).map(|lane| Arc::clone(lane.value()))
    }

    fn get_or_create_lane(&self, name: &str) -> Arc<Lane> {
        if let Some(lane) = self.lane(name) {
            return lane;
        }
        let lane = self
            .inner
            .lanes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Lane::new(name)));
        Arc::clone(lane.value())
    }

    /// Enqueue into the main lane.
    pub fn enqueue<T, E, F, Fut>(&self, task: F, opts: EnqueueOptions) -> LaneFuture<T, E>
    where
        T: Send + 'static,
        E: From<QueueError> + fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.enqueue_in_lane(CommandLane::Main.as_str(), task, opts)
    }

    /// Append `task` to `lane` and wake the lane's worker.
    ///
    /// The returned future settles with the task's own result. Entries
    /// discarded before admission resolve with `QueueError::Cleared`, a
    /// panicking task with `QueueError::TaskPanicked`, both converted into `E`.
    ///
    /// Called outside a Tokio runtime, the task starts once the returned
    /// future is first polled on one.
    pub fn enqueue_in_lane<T, E, F, Fut>(
        &self,
        lane: &str,
        task: F,
        opts: EnqueueOptions,
    ) -> LaneFuture<T, E>
    where
        T: Send + 'static,
        E: From<QueueError> + fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name = resolve_lane_name(lane).to_string();
        let lane = self.get_or_create_lane(&name);

        let (tx, rx) = oneshot::channel();
        let fingerprint = Arc::clone(self.inner.diagnostics.fingerprint());
        let queue_size = lane.push(QueueEntry {
            job: erase(name.clone(), task, tx, fingerprint),
            enqueued_at: Instant::now(),
            warn_after: opts.warn_after.unwrap_or(self.inner.default_warn_after),
            on_wait: opts.on_wait,
        });

        self.inner.diagnostics.enqueued(&name, queue_size);
        lane.signal(&self.inner.diagnostics);
        LaneFuture::new(name, rx)
            .with_starter(WorkerStarter::new(lane, Arc::clone(&self.inner.diagnostics)))
    }

    /// Set how many tasks `lane` may run at once (minimum 1).
    ///
    /// Raising the limit admits waiting entries right away. Lowering it
    /// cancels nothing; the lane admits again once it drops below the limit.
    pub fn set_lane_concurrency(&self, lane: &str, max_concurrent: usize) {
        let name = resolve_lane_name(lane);
        let lane = self.get_or_create_lane(name);
        let applied = lane.set_max_concurrent(max_concurrent);
        tracing::debug!(lane = %name, max_concurrent = applied, "Lane concurrency set");
        lane.signal(&self.inner.diagnostics);
    }

    /// Current limit for `lane`, if it exists.
    pub fn lane_concurrency(&self, lane: &str) -> Option<usize> {
        self.lane(resolve_lane_name(lane)).map(|l| l.max_concurrent())
    }

    /// Pending + active entries in `lane`. Unknown lanes report 0 and are not created.
    pub fn queue_size(&self, lane: &str) -> usize {
        self.lane(resolve_lane_name(lane))
            .map(|l| l.size())
            .unwrap_or(0)
    }

    pub fn main_queue_size(&self) -> usize {
        self.queue_size(CommandLane::Main.as_str())
    }

    /// Sum of `queue_size` over every known lane.
    pub fn total_queue_size(&self) -> usize {
        self.inner.lanes.iter().map(|lane| lane.size()).sum()
    }

    /// Discard entries in `lane` that have not started; returns how many.
    ///
    /// Running tasks are not touched. Each discarded entry's future resolves
    /// with `QueueError::Cleared`.
    pub fn clear_lane(&self, lane: &str) -> usize {
        let name = resolve_lane_name(lane);
        let Some(lane) = self.lane(name) else {
            return 0;
        };
        let removed = lane.clear();
        if removed > 0 {
            tracing::debug!(lane = %name, removed, "Lane cleared");
        }
        removed
    }

    /// Names of every lane touched so far, sorted.
    pub fn lane_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lanes.iter().map(|l| l.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every lane, sorted by name.
    pub fn lane_stats(&self) -> Vec<LaneSnapshot> {
        let mut stats: Vec<LaneSnapshot> = self.inner.lanes.iter().map(|l| l.snapshot()).collect();
        stats.sort_by(|a, b| a.lane.cmp(&b.lane));
        stats
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("lanes", &self.lane_names())
            .field("default_warn_after", &self.inner.default_warn_after)
            .finish()
    }
}

/// Builder for `CommandQueue`
pub struct CommandQueueBuilder {
    config: QueueConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    fingerprint: Option<ErrorFingerprint>,
}

impl Default for CommandQueueBuilder {
    fn default() -> Self {
        Self {
            config: QueueConfig::default(),
            sink: None,
            fingerprint: None,
        }
    }
}

impl CommandQueueBuilder {
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Where diagnostics go (default: `TracingSink`).
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// How task errors are keyed for dedup (default: `Display` output).
    pub fn fingerprint(
        mut self,
        fingerprint: impl Fn(&dyn fmt::Display) -> String + Send + Sync + 'static,
    ) -> Self {
        self.fingerprint = Some(Arc::new(fingerprint));
        self
    }

    /// Lanes with these prefixes never log task errors.
    pub fn quiet_lane_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.quiet_lane_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_warn_after(mut self, threshold: Duration) -> Self {
        self.config.default_warn_after_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn build(self) -> CommandQueue {
        let config = self.config;
        let diagnostics = LaneDiagnostics::new(
            self.sink
                .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>),
            config.wait_dedup_window(),
            config.error_dedup_window(),
            config.quiet_lane_prefixes.clone(),
            self.fingerprint.unwrap_or_else(display_fingerprint),
        );

        let lanes = DashMap::new();
        for (name, lane_config) in &config.lanes {
            let name = resolve_lane_name(name);
            let lane = Lane::new(name);
            lane.set_max_concurrent(lane_config.max_concurrent);
            lanes.insert(name.to_string(), Arc::new(lane));
        }

        CommandQueue {
            inner: Arc::new(QueueInner {
                lanes,
                diagnostics: Arc::new(diagnostics),
                default_warn_after: config.default_warn_after(),
            }),
        }
    }
}
