//! In-memory runtime for tests.
//!
//! Keeps a table of named containers, records every call, and can be told
//! to fail (or time out) on specific operations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::traits::ContainerRuntime;
use crate::types::{ContainerState, ContainerStats, ContainerSummary, RunSpec};

/// Operations a [`FakeRuntime`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Inspect,
    Run,
    Start,
    Stop,
    Restart,
    Remove,
    Logs,
    Stats,
    Update,
    List,
}

/// A container held by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub spec: RunSpec,
    pub status: String,
    pub restarts: u32,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    calls: Vec<(Op, String)>,
    failing: HashSet<Op>,
    timing_out: HashSet<Op>,
    /// Containers that appear once their name has been inspected N times.
    appearing: HashMap<String, usize>,
}

/// Fake runtime for testing.
#[derive(Default)]
pub struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` fail.
    pub fn fail_on(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    /// Make every future call of `op` time out.
    pub fn time_out_on(&self, op: Op) {
        self.lock().timing_out.insert(op);
    }

    /// Seed a running container named `name`.
    pub fn insert_running(&self, name: &str) {
        self.lock().containers.insert(name.to_string(), seeded(name));
    }

    /// Seed a running container named `name` that only shows up after
    /// `inspects` inspections of that name have reported it missing.
    pub fn insert_running_after_inspects(&self, name: &str, inspects: usize) {
        if inspects == 0 {
            return self.insert_running(name);
        }
        self.lock().appearing.insert(name.to_string(), inspects);
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(Op, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake runtime lock")
    }

    /// Record a call and apply any injected failure.
    fn enter(&self, op: Op, name: &str) -> RuntimeResult<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push((op, name.to_string()));
        let command = format!("fake {op:?} {name}");
        if inner.timing_out.contains(&op) {
            return Err(RuntimeError::Timeout {
                command,
                after: Duration::ZERO,
            });
        }
        if inner.failing.contains(&op) {
            return Err(RuntimeError::Failed {
                command,
                stderr: format!("injected {op:?} failure"),
            });
        }
        Ok(inner)
    }

    fn set_status(&self, op: Op, name: &str, status: &str) -> RuntimeResult<()> {
        let mut inner = self.enter(op, name)?;
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.status = status.to_string();
        if op == Op::Restart {
            container.restarts += 1;
        }
        Ok(())
    }
}

fn seeded(name: &str) -> FakeContainer {
    FakeContainer {
        spec: RunSpec {
            name: name.to_string(),
            image: "fake".to_string(),
            volume_host: String::new(),
            volume_container: String::new(),
            host_port: 0,
            container_port: 0,
            memory: String::new(),
            cpus: String::new(),
            env: Vec::new(),
            restart: None,
        },
        status: "running".to_string(),
        restarts: 0,
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn runtime_type(&self) -> &'static str {
        "fake"
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerState>> {
        let mut inner = self.enter(Op::Inspect, name)?;
        let state = inner.containers.get(name).map(|c| ContainerState {
            status: c.status.clone(),
            started_at: "2025-01-01T00:00:00Z".to_string(),
        });
        if let Some(remaining) = inner.appearing.get_mut(name) {
            *remaining -= 1;
            if *remaining == 0 {
                inner.appearing.remove(name);
                inner.containers.insert(name.to_string(), seeded(name));
            }
        }
        Ok(state)
    }

    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let mut inner = self.enter(Op::Run, &spec.name)?;
        if inner.containers.contains_key(&spec.name) {
            return Err(RuntimeError::NameInUse(spec.name.clone()));
        }
        inner.containers.insert(
            spec.name.clone(),
            FakeContainer {
                spec: spec.clone(),
                status: "running".to_string(),
                restarts: 0,
            },
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.set_status(Op::Start, name, "running")
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        self.set_status(Op::Stop, name, "exited")
    }

    async fn restart(&self, name: &str) -> RuntimeResult<()> {
        self.set_status(Op::Restart, name, "running")
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        let mut inner = self.enter(Op::Remove, name)?;
        inner.containers.remove(name);
        Ok(())
    }

    async fn logs(&self, name: &str, lines: u32) -> RuntimeResult<String> {
        let inner = self.enter(Op::Logs, name)?;
        if !inner.containers.contains_key(name) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok((1..=lines.min(3))
            .map(|i| format!("{name} line {i}\n"))
            .collect())
    }

    async fn stats(&self, name: &str) -> RuntimeResult<ContainerStats> {
        let inner = self.enter(Op::Stats, name)?;
        let container = inner
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        Ok(ContainerStats {
            cpu: "0.10%".to_string(),
            memory: format!("100MiB / {}", container.spec.memory),
            network: "0B / 0B".to_string(),
        })
    }

    async fn update_limits(&self, name: &str, memory: &str, cpus: &str) -> RuntimeResult<()> {
        let mut inner = self.enter(Op::Update, name)?;
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.spec.memory = memory.to_string();
        container.spec.cpus = cpus.to_string();
        Ok(())
    }

    async fn list(&self, prefix: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        let inner = self.enter(Op::List, prefix)?;
        let mut rows: Vec<ContainerSummary> = inner
            .containers
            .values()
            .filter_map(|c| {
                let tenant_id = c.spec.name.strip_prefix(prefix)?;
                Some(ContainerSummary {
                    tenant_id: tenant_id.to_string(),
                    name: c.spec.name.clone(),
                    status: c.status.clone(),
                    ports: format!("0.0.0.0:{}->{}/tcp", c.spec.host_port, c.spec.container_port),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}
