//! Task Types
//!
//! Type definitions shared by the pool, the trackers and the runner.

use serde::{Deserialize, Serialize};

use crate::error::WorkloadError;

/// Independent class of cancellable work with its own progress counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Fibonacci + sort workload
    A,
    /// Bubble-sort workload
    B,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::A, Family::B];

    /// Log target for per-task diagnostic lines
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::A => "task_a",
            Self::B => "task_b",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

impl std::str::FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            other => Err(format!("Unknown task family: {}", other)),
        }
    }
}

/// Task status
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`, with `Pending -> Cancelled`
/// and `Pending -> Failed` (rejected) as shortcuts. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
    /// Task is queued
    Pending = 0,
    /// Task is executing on a worker
    Running = 1,
    /// Task completed successfully
    Completed = 2,
    /// Task was cancelled
    Cancelled = 3,
    /// Task failed with error
    Failed = 4,
}

impl TaskStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    /// Check if task is still in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Check if task is terminal
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome delivered exactly once per task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(i64),
    Failure(WorkloadError),
    Cancelled,
}

impl Outcome {
    /// Status the handle ends in for this outcome
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Success(_) => TaskStatus::Completed,
            Self::Failure(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Success(value) => Some(*value),
            _ => None,
        }
    }
}

/// Task info for display and introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub family: Family,
    pub input: i64,
    pub status: TaskStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parse() {
        assert_eq!(" A ".parse::<Family>().unwrap(), Family::A);
        assert_eq!("b".parse::<Family>().unwrap(), Family::B);
        assert!("c".parse::<Family>().is_err());
    }

    #[test]
    fn test_status_roundtrip_through_u8() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_u8(status as u8), status);
        }
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(Outcome::Success(3).status(), TaskStatus::Completed);
        assert_eq!(Outcome::Cancelled.status(), TaskStatus::Cancelled);
        assert_eq!(
            Outcome::Failure(WorkloadError::EmptyList).status(),
            TaskStatus::Failed
        );
        assert_eq!(Outcome::Success(3).value(), Some(3));
        assert_eq!(Outcome::Cancelled.value(), None);
    }
}
