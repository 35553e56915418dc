//! Daemon configuration.
//!
//! Values come from three layers, strongest first: command-line flags
//! (most with an environment fallback), the optional `berth.toml`, and
//! built-in defaults.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

/// Contents of `berth.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BerthConfig {
    /// HTTP listen port.
    pub port: u16,
    pub data_dir: PathBuf,
    /// First host port handed to a tenant.
    pub base_port: u16,

    pub image: String,
    pub container_prefix: String,
    pub container_port: u16,
    pub config_mount: String,
    pub restart_policy: Option<String>,
    /// Container runtime CLI.
    pub runtime_binary: String,
    /// Bound on every runtime and reload command.
    pub command_timeout_secs: u64,

    pub caddyfile: PathBuf,
    /// Command that makes the proxy re-read `caddyfile`.
    pub reload_command: Vec<String>,
    pub domain_suffix: String,
    pub ip_lookup_url: String,
    pub ip_lookup_timeout_secs: u64,

    pub telegram_api_url: String,
    pub telegram_timeout_secs: u64,

    /// Container user that must own tenant directories.
    pub tenant_uid: u32,
    pub tenant_gid: u32,
    /// Set to false when the daemon cannot chown (e.g. not root).
    pub chown_tenant_dirs: bool,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: PathBuf::from("/opt/berth/data"),
            base_port: berth_state::DEFAULT_BASE_PORT,
            image: "ghcr.io/openclaw/openclaw:latest".to_string(),
            container_prefix: "openclaw-".to_string(),
            container_port: 18789,
            config_mount: "/home/node/.openclaw".to_string(),
            restart_policy: Some("unless-stopped".to_string()),
            runtime_binary: "docker".to_string(),
            command_timeout_secs: 120,
            caddyfile: PathBuf::from("/etc/caddy/Caddyfile"),
            reload_command: vec!["systemctl".to_string(), "reload".to_string(), "caddy".to_string()],
            domain_suffix: berth_proxy::DEFAULT_DOMAIN_SUFFIX.to_string(),
            ip_lookup_url: "http://ifconfig.me".to_string(),
            ip_lookup_timeout_secs: 10,
            telegram_api_url: berth_provision::TELEGRAM_API_URL.to_string(),
            telegram_timeout_secs: 10,
            tenant_uid: 1000,
            tenant_gid: 1000,
            chown_tenant_dirs: true,
        }
    }
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: BerthConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn ip_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_lookup_timeout_secs)
    }

    pub fn telegram_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram_timeout_secs)
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.data_dir.join("instances")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("berth.redb")
    }
}

/// Flags shared by the `serve` and `config` subcommands.
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Path to berth.toml.
    #[arg(long, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Data directory for the state store and tenant directories.
    #[arg(long, env = "BERTH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Shared secret expected in the X-API-Key header.
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Service-wide Gemini key for tenants that bring none.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Service-wide Groq key for tenants that bring none.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// Public IPv4 address; skips the outbound lookup.
    #[arg(long, env = "EXTERNAL_IP")]
    pub external_ip: Option<Ipv4Addr>,
}

impl ServeArgs {
    /// Load the config file (if any) and apply flag overrides.
    pub fn resolve(&self) -> anyhow::Result<BerthConfig> {
        let mut config = match &self.config {
            Some(path) => BerthConfig::from_file(path)?,
            None => BerthConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }

    /// The API secret, which has no default.
    pub fn require_secret(&self) -> anyhow::Result<&str> {
        match self.api_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => anyhow::bail!("API secret is required (--api-secret or API_SECRET)"),
        }
    }
}
