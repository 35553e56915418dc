//! Route synchronization: keeps the proxy config in step with tenants.
//!
//! `RouteSync` appends one site block per tenant to the live Caddyfile
//! and signals the proxy to reload. The file is append-only at runtime:
//! routes are never rewritten or retracted, so a deprovisioned tenant's
//! subdomain keeps pointing at a port nothing listens on any more.
//!
//! A subdomain gets at most one site block. Re-adding the same route only
//! reloads; routing it to a different port is refused.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};
use crate::host::PublicHost;
use crate::reload::Reloader;

/// A `subdomain → localhost:port` mapping found in the proxy config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub subdomain: String,
    pub port: u16,
}

/// Appends tenant routes to the proxy configuration and reloads it.
pub struct RouteSync {
    config_path: PathBuf,
    host: PublicHost,
    reloader: Arc<dyn Reloader>,
    /// Serializes append+reload pairs.
    write_lock: Mutex<()>,
}

impl RouteSync {
    pub fn new(config_path: impl Into<PathBuf>, host: PublicHost, reloader: Arc<dyn Reloader>) -> Self {
        Self {
            config_path: config_path.into(),
            host,
            reloader,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The subdomain a tenant is (or would be) routed under.
    pub fn subdomain_for(&self, tenant_id: &str) -> ProxyResult<String> {
        self.host.subdomain(tenant_id)
    }

    /// Check that `tenant_id` can be routed to `port` without touching
    /// anything. Returns the subdomain.
    pub async fn check_route(&self, tenant_id: &str, port: u16) -> ProxyResult<String> {
        let subdomain = self.host.subdomain(tenant_id)?;
        self.existing_port(&subdomain, port).await?;
        Ok(subdomain)
    }

    /// Route `tenant_id`'s subdomain to `localhost:port` and reload the
    /// proxy. Returns the subdomain.
    ///
    /// Both the append and the reload must succeed; an unreachable route
    /// is a provisioning failure.
    pub async fn add_route(&self, tenant_id: &str, port: u16) -> ProxyResult<String> {
        let subdomain = self.host.subdomain(tenant_id)?;

        let _guard = self.write_lock.lock().await;
        if self.existing_port(&subdomain, port).await?.is_some() {
            debug!(%subdomain, port, "route already present");
        } else {
            self.append(&route_block(&subdomain, port)).await?;
            debug!(%subdomain, port, path = ?self.config_path, "route appended");
        }

        self.reloader.reload().await?;
        info!(%tenant_id, %subdomain, port, "route added");
        Ok(subdomain)
    }

    /// All routes currently present in the config file.
    pub async fn routes(&self) -> ProxyResult<Vec<Route>> {
        match tokio::fs::read_to_string(&self.config_path).await {
            Ok(text) => Ok(parse_routes(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(self.config_error(source)),
        }
    }

    /// `Some(port)` if `subdomain` already routes to `port`, an error if
    /// it routes anywhere else.
    async fn existing_port(&self, subdomain: &str, port: u16) -> ProxyResult<Option<u16>> {
        let existing = self.routes().await?.into_iter().find(|r| r.subdomain == subdomain);
        match existing {
            None => Ok(None),
            Some(route) if route.port == port => Ok(Some(port)),
            Some(route) => Err(ProxyError::RouteTaken {
                subdomain: route.subdomain,
                port: route.port,
            }),
        }
    }

    async fn append(&self, block: &str) -> ProxyResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config_path)
            .await
            .map_err(|e| self.config_error(e))?;
        file.write_all(block.as_bytes())
            .await
            .map_err(|e| self.config_error(e))?;
        file.flush().await.map_err(|e| self.config_error(e))?;
        Ok(())
    }

    fn config_error(&self, source: std::io::Error) -> ProxyError {
        ProxyError::Config {
            path: self.config_path.display().to_string(),
            source,
        }
    }
}

/// Render the Caddyfile site block for one tenant.
pub fn route_block(subdomain: &str, port: u16) -> String {
    format!("\n{subdomain} {{\n    reverse_proxy localhost:{port}\n}}\n")
}

/// Extract `site → localhost:port` pairs from Caddyfile text.
///
/// Only recognizes blocks of the shape written by [`route_block`]; other
/// site blocks are ignored.
pub fn parse_routes(text: &str) -> Vec<Route> {
    let mut routes = Vec::new();
    let mut site: Option<&str> = None;
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_suffix('{') {
            site = Some(name.trim());
        } else if line == "}" {
            site = None;
        } else if let (Some(name), Some(target)) = (site, line.strip_prefix("reverse_proxy localhost:")) {
            if let Ok(port) = target.trim().parse() {
                routes.push(Route {
                    subdomain: name.to_string(),
                    port,
                });
            }
        }
    }
    routes
}
