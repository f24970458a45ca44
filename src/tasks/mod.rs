//! Tasks Module
//!
//! Task handles, lifecycle events and the runner that ties families,
//! trackers and the worker pool together.

pub mod events;
pub mod handle;
pub mod runner;
pub mod types;

pub use events::TaskEvent;
pub use handle::{CancelToken, TaskHandle, WorkItem};
pub use runner::TaskRunner;
pub use types::{Family, Outcome, TaskInfo, TaskStatus};
