//! Error types for the noesis platform

use thiserror::Error;

/// Main error type for the noesis crates
///
/// Every variant carries only owned strings so the error is `Clone`:
/// single-flight waiters observe the leader's failure by value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoesisError {
    /// No registered module accepted the task
    #[error("no capability module accepts task type '{task_type}'")]
    NoModule { task_type: String },

    /// Composite task type is not recognized by any decomposer
    #[error("no decomposition registered for task type '{task_type}'")]
    NoDecomposition { task_type: String },

    /// Module reported a permanent failure
    #[error("module failure: {0}")]
    ModuleFailure(String),

    /// Module reported a retryable failure; the dispatcher does not retry
    #[error("transient failure: {0}")]
    Transient(String),

    /// Effective deadline elapsed before the module returned
    #[error("timeout: {0}")]
    Timeout(String),

    /// Caller cancelled before the invocation completed
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Submission queue is full
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// Lifecycle precondition violation on `stop`
    #[error("evolution engine is not running")]
    EvolutionNotRunning,

    /// Lifecycle precondition violation on `start`
    #[error("evolution engine is already running")]
    EvolutionAlreadyRunning,

    /// Adaptive controller refused to act on too little data
    #[error("insufficient samples: need {required}, have {available}")]
    InsufficientSamples { required: usize, available: usize },

    /// Invalid input provided to an operation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Lock acquisition errors
    #[error("lock error: {0}")]
    LockError(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Service is shutting down and rejects new submissions
    #[error("service is shutting down")]
    ShuttingDown,

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for NoesisError {
    fn from(error: serde_json::Error) -> Self {
        NoesisError::Serialization(error.to_string())
    }
}

impl From<anyhow::Error> for NoesisError {
    fn from(error: anyhow::Error) -> Self {
        NoesisError::Other(error.to_string())
    }
}

/// Result type for the noesis crates
pub type Result<T> = std::result::Result<T, NoesisError>;
