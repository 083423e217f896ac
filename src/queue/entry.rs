// Queue entries and the future handed back to callers
//
// A caller's task is erased into a `Job` so lanes can hold tasks of any
// output type. Running the job yields a `Settlement`: what to report, plus a
// deferred delivery of the result to the caller.

use super::error::QueueError;
use super::lane::WorkerStarter;
use crate::diagnostics::ErrorFingerprint;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Called once at admission when the entry waited past its threshold,
/// with the wait and the number of entries still queued behind it.
pub type OnWait = Box<dyn FnOnce(Duration, usize) + Send>;

/// Per-enqueue options
#[derive(Default)]
pub struct EnqueueOptions {
    pub(crate) warn_after: Option<Duration>,
    pub(crate) on_wait: Option<OnWait>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the slow-wait threshold for this entry.
    pub fn warn_after(mut self, threshold: Duration) -> Self {
        self.warn_after = Some(threshold);
        self
    }

    pub fn warn_after_ms(self, ms: u64) -> Self {
        self.warn_after(Duration::from_millis(ms))
    }

    pub fn on_wait(mut self, observer: impl FnOnce(Duration, usize) + Send + 'static) -> Self {
        self.on_wait = Some(Box::new(observer));
        self
    }
}

impl fmt::Debug for EnqueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueOptions")
            .field("warn_after", &self.warn_after)
            .field("on_wait", &self.on_wait.is_some())
            .finish()
    }
}

/// Failure details for diagnostics
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub error: String,
    pub signature: String,
}

/// Result of running a job, before it reaches the caller.
pub(crate) struct Settlement {
    pub failure: Option<Failure>,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Settlement {
    /// Hand the outcome to the caller's `LaneFuture`.
    pub fn deliver(self) {
        (self.deliver)();
    }
}

pub(crate) type Job = Box<dyn FnOnce() -> BoxFuture<'static, Settlement> + Send>;

/// Erase a caller task into a job that reports back through `tx`.
pub(crate) fn erase<T, E, F, Fut>(
    lane: String,
    task: F,
    tx: oneshot::Sender<Result<T, E>>,
    fingerprint: ErrorFingerprint,
) -> Job
where
    T: Send + 'static,
    E: From<QueueError> + fmt::Display + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move || {
        async move {
            let outcome = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => {
                    let failure = result.as_ref().err().map(|err| Failure {
                        error: err.to_string(),
                        signature: fingerprint(err as &dyn fmt::Display),
                    });
                    Settlement {
                        failure,
                        deliver: Box::new(move || {
                            // Receiver gone means the caller stopped listening
                            let _ = tx.send(result);
                        }),
                    }
                }
                Err(_) => {
                    let err = QueueError::TaskPanicked { lane };
                    let text = err.to_string();
                    Settlement {
                        failure: Some(Failure {
                            error: text.clone(),
                            signature: text,
                        }),
                        deliver: Box::new(move || {
                            let _ = tx.send(Err(E::from(err)));
                        }),
                    }
                }
            }
        }
        .boxed()
    })
}

/// A pending task in a lane
pub(crate) struct QueueEntry {
    pub job: Job,
    pub enqueued_at: Instant,
    pub warn_after: Duration,
    pub on_wait: Option<OnWait>,
}

/// Resolves when the enqueued task settles.
///
/// Inside a runtime the task is scheduled whether or not this future is
/// polled, and dropping it does not cancel the task. A future created outside
/// a runtime starts the lane's worker on its first poll.
pub struct LaneFuture<T, E> {
    lane: String,
    rx: oneshot::Receiver<Result<T, E>>,
    starter: Option<WorkerStarter>,
}

impl<T, E> LaneFuture<T, E> {
    pub(crate) fn new(lane: String, rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self {
            lane,
            rx,
            starter: None,
        }
    }

    pub(crate) fn with_starter(mut self, starter: WorkerStarter) -> Self {
        self.starter = Some(starter);
        self
    }

    /// Lane the task was enqueued into (after name resolution).
    pub fn lane(&self) -> &str {
        &self.lane
    }
}

// The receiver is never pinned structurally
impl<T, E> Unpin for LaneFuture<T, E> {}

impl<T, E: From<QueueError>> Future for LaneFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(starter) = this.starter.take() {
            starter.start();
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a result: the entry never ran
            Poll::Ready(Err(_)) => Poll::Ready(Err(E::from(QueueError::Cleared {
                lane: this.lane.clone(),
            }))),
        }
    }
}

impl<T, E> fmt::Debug for LaneFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneFuture").field("lane", &self.lane).finish()
    }
}
