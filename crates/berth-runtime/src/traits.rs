//! The container runtime capability.

use async_trait::async_trait;

use crate::error::RuntimeResult;
use crate::types::{ContainerState, ContainerStats, ContainerSummary, RunSpec};

/// Narrow interface to whatever runs tenant containers.
///
/// Containers are addressed by name. Implementations are pure adapters:
/// they never touch the state store, and every call is bounded in time.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime identifier for logs (e.g. "docker", "fake").
    fn runtime_type(&self) -> &'static str;

    /// Inspect a container. A missing container is `Ok(None)`.
    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerState>>;

    /// Create and start a container in the background.
    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()>;

    async fn start(&self, name: &str) -> RuntimeResult<()>;

    async fn stop(&self, name: &str) -> RuntimeResult<()>;

    async fn restart(&self, name: &str) -> RuntimeResult<()>;

    /// Force-remove a container, stopping it first if needed.
    /// Removing a missing container succeeds.
    async fn remove(&self, name: &str) -> RuntimeResult<()>;

    /// Last `lines` lines of combined output.
    async fn logs(&self, name: &str, lines: u32) -> RuntimeResult<String>;

    async fn stats(&self, name: &str) -> RuntimeResult<ContainerStats>;

    /// Change memory/CPU caps on a live container without restarting it.
    async fn update_limits(&self, name: &str, memory: &str, cpus: &str) -> RuntimeResult<()>;

    /// All containers whose name starts with `prefix`, running or not.
    async fn list(&self, prefix: &str) -> RuntimeResult<Vec<ContainerSummary>>;
}
