//! Docker CLI adapter.
//!
//! Each operation is one `docker` invocation with arguments passed as an
//! argv vector (never through a shell). Every invocation is wrapped in a
//! timeout; on expiry the child is killed when its future is dropped.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::traits::ContainerRuntime;
use crate::types::{ContainerState, ContainerStats, ContainerSummary, RunSpec};

/// Field separator used in all `--format` templates.
const SEP: char = '\t';

const INSPECT_FORMAT: &str = "{{.State.Status}}\t{{.State.StartedAt}}";
const PS_FORMAT: &str = "{{.Names}}\t{{.Status}}\t{{.Ports}}";
const STATS_FORMAT: &str = "{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}";

/// Talks to the Docker daemon through its command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Run the CLI and return its raw output, whatever the exit status.
    async fn exec_raw(&self, args: &[&str]) -> RuntimeResult<(String, Output)> {
        let command = describe(&self.binary, args);
        debug!(%command, "running container runtime");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => Ok((command, output?)),
            Err(_) => Err(RuntimeError::Timeout {
                command,
                after: self.timeout,
            }),
        }
    }

    /// Run the CLI, returning stdout on success.
    async fn exec(&self, args: &[&str]) -> RuntimeResult<String> {
        let (command, output) = self.exec_raw(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(classify_failure(command, &output.stderr))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerState>> {
        match self.exec(&["inspect", "--format", INSPECT_FORMAT, name]).await {
            Ok(stdout) => parse_inspect(&stdout).map(Some),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.exec(&args).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.exec(&["start", name]).await.map(drop)
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        self.exec(&["stop", name]).await.map(drop)
    }

    async fn restart(&self, name: &str) -> RuntimeResult<()> {
        self.exec(&["restart", name]).await.map(drop)
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        match self.exec(&["rm", "-f", name]).await {
            Ok(_) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn logs(&self, name: &str, lines: u32) -> RuntimeResult<String> {
        let tail = lines.to_string();
        let (command, output) = self.exec_raw(&["logs", "--tail", &tail, name]).await?;
        if !output.status.success() {
            return Err(classify_failure(command, &output.stderr));
        }
        // The container's stderr stream arrives on our stderr.
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn stats(&self, name: &str) -> RuntimeResult<ContainerStats> {
        let stdout = self
            .exec(&["stats", name, "--no-stream", "--format", STATS_FORMAT])
            .await?;
        parse_stats(&stdout)
    }

    async fn update_limits(&self, name: &str, memory: &str, cpus: &str) -> RuntimeResult<()> {
        let memory = format!("--memory={memory}");
        let cpus = format!("--cpus={cpus}");
        self.exec(&["update", &memory, &cpus, name]).await.map(drop)
    }

    async fn list(&self, prefix: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        let filter = format!("name={prefix}");
        let stdout = self
            .exec(&["ps", "-a", "--filter", &filter, "--format", PS_FORMAT])
            .await?;
        Ok(stdout
            .lines()
            .filter_map(|line| parse_ps_line(line, prefix))
            .collect())
    }
}

/// Build the argv for `docker run`.
pub fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(policy) = &spec.restart {
        args.push("--restart".to_string());
        args.push(policy.clone());
    }
    args.push("-v".to_string());
    args.push(format!("{}:{}", spec.volume_host, spec.volume_container));
    args.push("-p".to_string());
    args.push(format!("{}:{}", spec.host_port, spec.container_port));
    args.push(format!("--memory={}", spec.memory));
    args.push(format!("--cpus={}", spec.cpus));
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

fn describe(binary: &str, args: &[&str]) -> String {
    // Subcommand plus target is enough to identify a call in logs.
    match args {
        [] => binary.to_string(),
        [sub] => format!("{binary} {sub}"),
        [sub, .., last] => format!("{binary} {sub} {last}"),
    }
}

fn classify_failure(command: String, stderr: &[u8]) -> RuntimeError {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if stderr.contains("No such container") || stderr.contains("No such object") {
        RuntimeError::NotFound(stderr)
    } else if stderr.contains("is already in use by container") {
        RuntimeError::NameInUse(stderr)
    } else {
        RuntimeError::Failed { command, stderr }
    }
}

fn parse_inspect(stdout: &str) -> RuntimeResult<ContainerState> {
    let line = stdout.trim();
    let (status, started_at) = line
        .split_once(SEP)
        .ok_or_else(|| RuntimeError::Parse(format!("inspect: {line:?}")))?;
    Ok(ContainerState {
        status: status.to_string(),
        started_at: started_at.to_string(),
    })
}

fn parse_stats(stdout: &str) -> RuntimeResult<ContainerStats> {
    let line = stdout.trim();
    let mut fields = line.splitn(3, SEP);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(cpu), Some(memory), Some(network)) => Ok(ContainerStats {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
            network: network.to_string(),
        }),
        _ => Err(RuntimeError::Parse(format!("stats: {line:?}"))),
    }
}

fn parse_ps_line(line: &str, prefix: &str) -> Option<ContainerSummary> {
    let mut fields = line.splitn(3, SEP);
    let name = fields.next()?.trim();
    // `--filter name=` is a substring match; keep only true prefixes.
    let tenant_id = name.strip_prefix(prefix)?;
    if tenant_id.is_empty() {
        return None;
    }
    Some(ContainerSummary {
        tenant_id: tenant_id.to_string(),
        name: name.to_string(),
        status: fields.next().unwrap_or_default().to_string(),
        ports: fields.next().unwrap_or_default().to_string(),
    })
}
