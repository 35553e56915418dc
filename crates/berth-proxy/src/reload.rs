//! Reload signals for the reverse-proxy process.

use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};

/// Tells the proxy to re-read its configuration without dropping
/// existing connections.
#[async_trait]
pub trait Reloader: Send + Sync {
    async fn reload(&self) -> ProxyResult<()>;
}

/// Runs an external command such as `systemctl reload caddy`.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandReloader {
    /// Build from an argv vector. Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl Reloader for CommandReloader {
    async fn reload(&self) -> ProxyResult<()> {
        debug!(program = %self.program, args = ?self.args, "reloading proxy");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProxyError::ReloadTimeout(self.timeout))?
            .map_err(|e| ProxyError::Reload(format!("{}: {e}", self.program)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ProxyError::Reload(format!("{} exited with {}: {stderr}", self.program, output.status)))
        }
    }
}

/// Reloader with a fixed outcome that counts its invocations.
///
/// Used when no reload command is configured (`Ok`), and by tests to
/// inject reload failures.
#[derive(Debug, Default)]
pub struct ScriptedReloader {
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedReloader {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Mutex::new(Some(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the outcome of future reloads.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().expect("reloader lock") = message.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reloader for ScriptedReloader {
    async fn reload(&self) -> ProxyResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().expect("reloader lock").clone() {
            Some(message) => Err(ProxyError::Reload(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argv_is_rejected() {
        assert!(CommandReloader::from_argv(&[], Duration::from_secs(1)).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_outcomes() {
        let ok = CommandReloader::from_argv(&["true".to_string()], Duration::from_secs(5)).unwrap();
        ok.reload().await.unwrap();

        let failing =
            CommandReloader::from_argv(&["false".to_string()], Duration::from_secs(5)).unwrap();
        assert!(matches!(failing.reload().await, Err(ProxyError::Reload(_))));

        let slow = CommandReloader::from_argv(
            &["sleep".to_string(), "5".to_string()],
            Duration::from_millis(50),
        )
        .unwrap();
        assert!(matches!(slow.reload().await, Err(ProxyError::ReloadTimeout(_))));
    }

    #[tokio::test]
    async fn scripted_counts_and_switches() {
        let reloader = ScriptedReloader::ok();
        reloader.reload().await.unwrap();
        reloader.set_failure(Some("caddy down"));
        assert!(reloader.reload().await.is_err());
        assert_eq!(reloader.calls(), 2);
    }
}
