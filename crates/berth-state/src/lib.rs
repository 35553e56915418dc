//! berth-state — embedded state store for Berth.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the two pieces of durable tenant state:
//!
//! - **Port registry**: `tenant_id → host port`, allocated monotonically
//!   and never reclaimed.
//! - **Instance records**: one JSON metadata document per tenant
//!   (port, subdomain, plan, credentials, timestamps).
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod ports;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ports::{DEFAULT_BASE_PORT, PortLease, PortRegistry};
pub use store::StateStore;
pub use types::*;
