//! berth-proxy — reverse-proxy synchronization for tenant subdomains.
//!
//! Each provisioned tenant gets one site block in the proxy's config file
//! mapping `{tenant}.{external_ip}.{suffix}` to `localhost:{port}`.
//!
//! # Components
//!
//! - **`host`**: external IP lookup and subdomain derivation
//! - **`sync`**: append-only route writer plus config parsing
//! - **`reload`**: proxy reload signal (external command or scripted)

pub mod error;
pub mod host;
pub mod reload;
pub mod sync;

pub use error::{ProxyError, ProxyResult};
pub use host::{DEFAULT_DOMAIN_SUFFIX, PublicHost, lookup_external_ip};
pub use reload::{CommandReloader, Reloader, ScriptedReloader};
pub use sync::{Route, RouteSync, parse_routes, route_block};
