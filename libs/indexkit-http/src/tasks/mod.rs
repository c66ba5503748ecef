//! Asynchronous task tracking.
//!
//! Mutating calls are accepted immediately and answer with a [`TaskHandle`];
//! the effect becomes visible once the task reaches a terminal
//! [`TaskStatus`]. [`TaskPoller`] turns that into a bounded wait.

mod backoff;
mod model;
mod poller;

pub use model::{TaskError, TaskHandle, TaskId, TaskRecord, TaskStatus};
pub use poller::TaskPoller;
