//! Container runtime error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`ContainerRuntime`](crate::ContainerRuntime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The named container does not exist.
    #[error("no such container: {0}")]
    NotFound(String),

    /// Another container already holds the name.
    #[error("container name already in use: {0}")]
    NameInUse(String),

    /// The runtime ran but reported failure.
    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    /// The runtime did not answer within the configured bound.
    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// The runtime binary could not be executed.
    #[error("failed to spawn runtime: {0}")]
    Spawn(#[from] std::io::Error),

    /// The runtime answered with output we could not interpret.
    #[error("unexpected runtime output: {0}")]
    Parse(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
