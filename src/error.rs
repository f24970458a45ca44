//! Error Types
//!
//! Error taxonomy for the task engine. Cancellation is not an error and has no
//! variant here; it is reported as a normal terminal outcome.

use thiserror::Error;

/// Rejected caller input; no task is created and no counter changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Input is not an integer: {0:?}")]
    NotAnInteger(String),
}

/// Failure raised by a workload (or on its behalf by the pool)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("Cannot take the maximum of an empty list")]
    EmptyList,

    #[error("Random range [1, {size}) is empty")]
    EmptyRange { size: i64 },

    #[error("List of {size} elements exceeds the workload limit")]
    TooLarge { size: i64 },

    #[error("Interrupted by cancellation")]
    Interrupted,

    #[error("Workload panicked: {0}")]
    Panicked(String),

    #[error("Pool is shut down, work was not accepted")]
    Rejected,
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool is shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Top-level engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No tokio runtime available to drive progress aggregation")]
    NoRuntime,
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(format!("TOML parse error: {}", err))
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
