// lane-queue - in-process lane-based command scheduler
// Library exports

pub mod config;
pub mod diagnostics;
pub mod lanes;
pub mod logging;
pub mod queue;

pub use config::{load_config, QueueConfig};
pub use diagnostics::{DiagnosticSink, LaneEvent, RecordingSink, TracingSink};
pub use lanes::CommandLane;
pub use queue::{CommandQueue, CommandQueueBuilder, EnqueueOptions, LaneFuture, LaneSnapshot, QueueError};
