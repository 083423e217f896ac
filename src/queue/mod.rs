// Lane-based command queue
//
// Serializes (or bounds) concurrent execution of async tasks per lane while
// unrelated lanes run in parallel.

mod command_queue;
mod entry;
mod error;
mod lane;

pub use command_queue::{CommandQueue, CommandQueueBuilder};
pub use entry::{EnqueueOptions, LaneFuture, OnWait};
pub use error::QueueError;
pub use lane::LaneSnapshot;
