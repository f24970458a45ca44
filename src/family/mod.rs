//! Task Families
//!
//! Per-family in-flight tracking and the aggregate progress flag.

pub mod progress;
pub mod tracker;

pub use progress::ProgressAggregator;
pub use tracker::{FamilySnapshot, FamilyTracker};
