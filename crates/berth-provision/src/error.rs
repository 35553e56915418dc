//! Provisioning error types.

use berth_proxy::ProxyError;
use berth_runtime::RuntimeError;
use berth_state::StateError;
use thiserror::Error;

/// Errors surfaced by provisioning and lifecycle operations.
///
/// Validation and conflict errors are raised before any side effect.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// The tenant already has a live container.
    #[error("instance already exists: {0}")]
    Conflict(String),

    #[error("instance not found: {0}")]
    NotFound(String),

    /// A container runtime, proxy, or filesystem operation failed.
    #[error("{0}")]
    Downstream(String),

    /// An external process did not answer in time.
    #[error("{0}")]
    Timeout(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl From<RuntimeError> for ProvisionError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotFound(name) => ProvisionError::NotFound(name),
            RuntimeError::NameInUse(name) => ProvisionError::Conflict(name),
            e @ RuntimeError::Timeout { .. } => ProvisionError::Timeout(e.to_string()),
            e => ProvisionError::Downstream(e.to_string()),
        }
    }
}

impl From<StateError> for ProvisionError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => ProvisionError::NotFound(id),
            e => ProvisionError::Downstream(format!("state store: {e}")),
        }
    }
}

impl From<ProxyError> for ProvisionError {
    fn from(e: ProxyError) -> Self {
        match e {
            e @ ProxyError::ReloadTimeout(_) => ProvisionError::Timeout(e.to_string()),
            e => ProvisionError::Downstream(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(e: std::io::Error) -> Self {
        ProvisionError::Downstream(format!("filesystem: {e}"))
    }
}
