//! Types exchanged with a container runtime.

use serde::Serialize;

/// Everything needed to create and start a tenant container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Container name (`{prefix}{tenant_id}`).
    pub name: String,
    pub image: String,
    /// Host directory bind-mounted into the container.
    pub volume_host: String,
    pub volume_container: String,
    /// Host port published to `container_port`.
    pub host_port: u16,
    pub container_port: u16,
    /// Memory cap in runtime notation (`1280m`, `2g`).
    pub memory: String,
    /// CPU share (`0.5`).
    pub cpus: String,
    pub env: Vec<(String, String)>,
    /// Restart policy, e.g. `unless-stopped`.
    pub restart: Option<String>,
}

/// Result of inspecting a container by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerState {
    /// Runtime status word (`running`, `exited`, `created`, ...).
    pub status: String,
    /// Start timestamp as reported by the runtime.
    pub started_at: String,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// One row of the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    /// Container name with the tenant prefix stripped.
    pub tenant_id: String,
    pub name: String,
    /// Human-readable status (`Up 3 hours`).
    pub status: String,
    /// Published port description.
    pub ports: String,
}

/// Point-in-time resource usage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub cpu: String,
    pub memory: String,
    pub network: String,
}
