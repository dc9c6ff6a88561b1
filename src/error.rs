use std::time::Duration;
use thiserror::Error;

/// Errors produced by the render queue subsystem
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file problems
    #[error("config error: {0}")]
    Config(String),

    /// Frame or sequence validation failed before encoding
    #[error("validation error: {0}")]
    Validation(String),

    /// ffprobe invocation or output parsing failed
    #[error("probe error: {0}")]
    Probe(String),

    /// No worker became idle within the submission timeout
    #[error("no idle worker within {0:?}")]
    PoolBusy(Duration),

    /// The pending queue is at capacity
    #[error("render queue is full")]
    QueueFull,

    /// The queue is no longer accepting submissions
    #[error("queue is shutting down")]
    ShuttingDown,

    /// Operation referenced a job that does not exist
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
