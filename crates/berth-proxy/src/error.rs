//! Proxy synchronizer error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The public address was never resolved, so no subdomain can be built.
    #[error("public host is not resolved; cannot derive a subdomain")]
    HostUnresolved,

    /// The subdomain is already routed to a different port.
    #[error("{subdomain} is already routed to port {port}")]
    RouteTaken { subdomain: String, port: u16 },

    #[error("proxy config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy reload failed: {0}")]
    Reload(String),

    #[error("proxy reload timed out after {0:?}")]
    ReloadTimeout(Duration),

    #[error("external IP lookup failed: {0}")]
    Lookup(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
