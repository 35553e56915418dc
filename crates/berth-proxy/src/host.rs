//! Public host resolution and subdomain derivation.
//!
//! Tenant subdomains embed the machine's external IPv4 address under a
//! wildcard-DNS suffix (`{tenant}.{ip}.nip.io`). The address is looked up
//! once at startup and then frozen in a [`PublicHost`]; if the lookup
//! failed, subdomain derivation fails explicitly instead of producing a
//! malformed name.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};

/// Default wildcard-DNS suffix.
pub const DEFAULT_DOMAIN_SUFFIX: &str = "nip.io";

/// The machine's public identity, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicHost {
    ip: Option<Ipv4Addr>,
    domain_suffix: String,
}

impl PublicHost {
    pub fn resolved(ip: Ipv4Addr, domain_suffix: &str) -> Self {
        Self {
            ip: Some(ip),
            domain_suffix: domain_suffix.to_string(),
        }
    }

    /// A host whose address could not be determined.
    pub fn unresolved(domain_suffix: &str) -> Self {
        Self {
            ip: None,
            domain_suffix: domain_suffix.to_string(),
        }
    }

    /// `{tenant_id}.{ip}.{suffix}`.
    pub fn subdomain(&self, tenant_id: &str) -> ProxyResult<String> {
        let ip = self.ip.ok_or(ProxyError::HostUnresolved)?;
        Ok(format!("{tenant_id}.{ip}.{}", self.domain_suffix))
    }
}

/// Ask an echo service (`http://ifconfig.me` style) for our public IPv4
/// address. The whole request is bounded by `timeout`.
pub async fn lookup_external_ip(url: &str, timeout: Duration) -> ProxyResult<Ipv4Addr> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("curl/8")
        .build()
        .map_err(|e| ProxyError::Lookup(e.to_string()))?;

    let body = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ProxyError::Lookup(e.to_string()))?
        .text()
        .await
        .map_err(|e| ProxyError::Lookup(e.to_string()))?;

    let trimmed = body.trim();
    debug!(%url, response = %trimmed, "external IP lookup answered");
    let ip: Ipv4Addr = trimmed
        .parse()
        .map_err(|_| ProxyError::Lookup(format!("not an IPv4 address: {trimmed:?}")))?;
    info!(%ip, "external IP resolved");
    Ok(ip)
}
