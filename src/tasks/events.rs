//! Task Events
//!
//! Structured counterparts of the per-task diagnostic log lines.

use serde::{Deserialize, Serialize};

use super::types::Family;

/// Lifecycle event of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskEvent {
    /// Task began executing on a worker
    Started {
        id: String,
        family: Family,
        input: i64,
        at: String,
    },
    /// Task produced a result
    Finished {
        id: String,
        family: Family,
        input: i64,
        duration_ms: u64,
        result: i64,
    },
    /// Task was cancelled before or during execution
    Cancelled {
        id: String,
        family: Family,
        input: i64,
        duration_ms: u64,
    },
    /// Workload returned an error or panicked
    Failed {
        id: String,
        family: Family,
        input: i64,
        error: String,
    },
}

impl TaskEvent {
    /// Get the task ID from any event
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started { id, .. } => id,
            Self::Finished { id, .. } => id,
            Self::Cancelled { id, .. } => id,
            Self::Failed { id, .. } => id,
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Self::Started { family, .. } => *family,
            Self::Finished { family, .. } => *family,
            Self::Cancelled { family, .. } => *family,
            Self::Failed { family, .. } => *family,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors_and_tagging() {
        let event = TaskEvent::Cancelled {
            id: "task-1".to_string(),
            family: Family::B,
            input: 5,
            duration_ms: 12,
        };

        assert_eq!(event.task_id(), "task-1");
        assert_eq!(event.family(), Family::B);
        assert!(event.is_terminal());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cancelled");
        assert_eq!(json["family"], "b");
    }
}
