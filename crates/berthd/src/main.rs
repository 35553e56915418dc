//! berthd — the Berth daemon.
//!
//! Single binary that assembles the provisioning control plane:
//! - State store (redb): port registry + instance records
//! - Container runtime adapter (Docker CLI)
//! - Reverse-proxy route sync (Caddyfile + reload command)
//! - Provisioning orchestrator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! API_SECRET=... berthd serve --port 3000 --data-dir /opt/berth/data
//! berthd config --config /etc/berth/berth.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use berth_api::{ApiState, build_router};
use berth_provision::{ProviderDefaults, ProvisionSettings, Provisioner, TelegramValidator, TenantOwner};
use berth_proxy::{CommandReloader, PublicHost, RouteSync, lookup_external_ip};
use berth_runtime::{ContainerRuntime, DockerCli};
use berth_state::{PortRegistry, StateStore};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{BerthConfig, ServeArgs};

const DEFAULT_LOG_FILTER: &str = "info,berthd=debug,berth=debug";

#[derive(Parser)]
#[command(name = "berthd", about = "Berth tenant provisioning daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the provisioning API.
    Serve(ServeArgs),

    /// Print the effective configuration as TOML.
    Config(ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Config(args) => {
            print!("{}", args.resolve()?.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.resolve()?;
    let api_secret = args.require_secret()?;
    info!("Berth daemon starting");

    // ── Storage ────────────────────────────────────────────────

    std::fs::create_dir_all(config.instances_dir())
        .with_context(|| format!("creating {}", config.instances_dir().display()))?;
    let db_path = config.db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let ports = PortRegistry::new(store.clone(), config.base_port);
    info!(base_port = config.base_port, next_port = ports.next_port()?, "port registry ready");

    // ── Public host ────────────────────────────────────────────

    let host = resolve_public_host(&config, &args).await;

    // ── Collaborators ──────────────────────────────────────────

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCli::new(&config.runtime_binary, config.command_timeout()));
    info!(runtime = runtime.runtime_type(), binary = %config.runtime_binary, "container runtime configured");

    let reloader = CommandReloader::from_argv(&config.reload_command, config.command_timeout())
        .context("reload_command must not be empty")?;
    let routes = Arc::new(RouteSync::new(&config.caddyfile, host, Arc::new(reloader)));
    info!(caddyfile = ?config.caddyfile, "route sync configured");

    let validator = TelegramValidator::new(&config.telegram_api_url, config.telegram_timeout())?;

    let provisioner = Provisioner::new(
        provision_settings(&config, &args),
        store,
        ports,
        routes,
        runtime,
    );

    // ── API server ─────────────────────────────────────────────

    let state = ApiState::new(provisioner, Arc::new(validator), api_secret);
    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("Berth daemon stopped");
    Ok(())
}

/// Resolve the public address once, before the listener binds. A failed
/// lookup leaves the host unresolved; provisioning then fails until the
/// daemon is restarted with a reachable lookup or `--external-ip`.
async fn resolve_public_host(config: &BerthConfig, args: &ServeArgs) -> PublicHost {
    if let Some(ip) = args.external_ip {
        info!(%ip, "public address set explicitly");
        return PublicHost::resolved(ip, &config.domain_suffix);
    }
    match lookup_external_ip(&config.ip_lookup_url, config.ip_lookup_timeout()).await {
        Ok(ip) => PublicHost::resolved(ip, &config.domain_suffix),
        Err(e) => {
            warn!(error = %e, url = %config.ip_lookup_url, "public address unresolved; provisioning disabled");
            PublicHost::unresolved(&config.domain_suffix)
        }
    }
}

fn provision_settings(config: &BerthConfig, args: &ServeArgs) -> ProvisionSettings {
    ProvisionSettings {
        instances_dir: config.instances_dir(),
        image: config.image.clone(),
        container_prefix: config.container_prefix.clone(),
        container_port: config.container_port,
        config_mount: config.config_mount.clone(),
        restart_policy: config.restart_policy.clone(),
        tenant_owner: config.chown_tenant_dirs.then_some(TenantOwner {
            uid: config.tenant_uid,
            gid: config.tenant_gid,
        }),
        providers: ProviderDefaults {
            gemini_api_key: args.gemini_api_key.clone(),
            groq_api_key: args.groq_api_key.clone(),
        },
    }
}
