//! Port registry: monotonic host-port allocation per tenant.
//!
//! New ports are `max(assigned ∪ {base_port - 1}) + 1`. Freed ports are
//! never handed out again: a deprovisioned tenant keeps its entry so a
//! stale route cannot end up pointing at somebody else's container. When
//! that tenant is provisioned again it gets its old port back, which keeps
//! its one proxy route valid.
//!
//! Allocation and persistence are two separate steps of the provisioning
//! sequence with container creation in between. [`PortRegistry::allocate`]
//! returns a [`PortLease`] that holds the registry's allocation lock until
//! it is committed or dropped, so two concurrent provisions can never be
//! handed the same port.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::store::StateStore;

/// Default first port handed out by an empty registry.
pub const DEFAULT_BASE_PORT: u16 = 18001;

/// Durable tenant → port mapping with a serialized allocator.
#[derive(Clone)]
pub struct PortRegistry {
    store: StateStore,
    base_port: u16,
    allocation: Arc<Mutex<()>>,
}

impl PortRegistry {
    pub fn new(store: StateStore, base_port: u16) -> Self {
        Self {
            store,
            base_port,
            allocation: Arc::new(Mutex::new(())),
        }
    }

    /// Compute the next port without reserving it.
    pub fn next_port(&self) -> StateResult<u16> {
        let ports = self.store.read_ports()?;
        let floor = self.base_port.saturating_sub(1);
        let max = ports.values().copied().fold(floor, u16::max);
        max.checked_add(1).ok_or(StateError::PortsExhausted(max))
    }

    /// Reserve a port for `tenant_id`: the one it already holds, or the
    /// next free one.
    ///
    /// Waits for any in-flight lease to finish first. The returned lease
    /// must be committed for a new port to be recorded.
    pub async fn allocate(&self, tenant_id: &str) -> StateResult<PortLease> {
        let guard = Arc::clone(&self.allocation).lock_owned().await;
        let (port, reused) = match self.store.read_port(tenant_id)? {
            Some(port) => (port, true),
            None => (self.next_port()?, false),
        };
        debug!(%tenant_id, port, reused, "port leased");
        Ok(PortLease {
            tenant_id: tenant_id.to_string(),
            port,
            reused,
            registry: self.clone(),
            _guard: guard,
        })
    }

    /// Record `port` for `tenant_id`, replacing any previous entry.
    pub fn save(&self, tenant_id: &str, port: u16) -> StateResult<()> {
        self.store.write_port(tenant_id, port)?;
        debug!(%tenant_id, port, "port saved");
        Ok(())
    }

    /// The tenant's port, or `None` if it has none or the registry
    /// cannot be read.
    pub fn lookup(&self, tenant_id: &str) -> Option<u16> {
        match self.store.read_port(tenant_id) {
            Ok(port) => port,
            Err(e) => {
                warn!(%tenant_id, error = %e, "port lookup failed");
                None
            }
        }
    }

    /// Snapshot of the full mapping.
    pub fn list(&self) -> StateResult<BTreeMap<String, u16>> {
        self.store.read_ports()
    }
}

/// A port reserved by [`PortRegistry::allocate`].
///
/// Holds the allocation lock. Dropping the lease without committing
/// releases the lock and leaves the registry untouched.
pub struct PortLease {
    tenant_id: String,
    port: u16,
    reused: bool,
    registry: PortRegistry,
    _guard: OwnedMutexGuard<()>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the tenant already held this port before the lease.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Persist the leased port and release the lock.
    pub fn commit(self) -> StateResult<u16> {
        if !self.reused {
            self.registry.save(&self.tenant_id, self.port)?;
        }
        Ok(self.port)
    }
}

impl std::fmt::Debug for PortLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLease")
            .field("tenant_id", &self.tenant_id)
            .field("port", &self.port)
            .field("reused", &self.reused)
            .finish()
    }
}
