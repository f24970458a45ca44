//! Cancellable task families on a resizable worker pool.
//!
//! Work is submitted per family through [`TaskRunner`], executed on a
//! [`WorkerPool`] of OS threads, and tracked per family so that a busy flag
//! and an aggregate progress flag can be observed by a display layer.

pub mod config;
pub mod error;
pub mod family;
pub mod pool;
pub mod tasks;
pub mod workloads;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, PoolError, ValidationError, WorkloadError};
pub use family::{FamilySnapshot, FamilyTracker, ProgressAggregator};
pub use pool::{PoolConfig, WorkerPool};
pub use tasks::{CancelToken, Family, Outcome, TaskEvent, TaskHandle, TaskRunner, TaskStatus};
