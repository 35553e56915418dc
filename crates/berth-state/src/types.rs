//! Domain types for the Berth state store.
//!
//! These types represent the persisted metadata of provisioned tenants and
//! the static plan tier table. Records are JSON-serialized with camelCase
//! keys so the stored documents stay readable by the onboarding frontend.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a tenant. Also the suffix of its container name
/// and the leftmost label of its public subdomain.
pub type TenantId = String;

/// Length of the free-tier trial.
pub const TRIAL_DAYS: i64 = 7;

// ── Plan tiers ────────────────────────────────────────────────────

/// Named resource-limit bundle a tenant is provisioned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Pro,
    Power,
}

impl PlanTier {
    /// All tiers, cheapest first.
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Pro,
        PlanTier::Power,
    ];

    /// Look up a tier by its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.as_str() == name)
    }

    /// Resolve an optional requested tier, falling back to the most
    /// conservative one when the name is missing or unknown.
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(Self::from_name).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Power => "power",
        }
    }

    /// Container resource caps for this tier.
    ///
    /// Free and starter share limits: the agent needs roughly 500 MiB at
    /// startup, so 768 MiB of heap inside a 1280 MiB cap is the floor.
    pub fn limits(self) -> ResourceLimits {
        let (memory, cpus, heap_mb) = match self {
            PlanTier::Free | PlanTier::Starter => ("1280m", "0.5", 768),
            PlanTier::Pro => ("1536m", "1.0", 1024),
            PlanTier::Power => ("2g", "2.0", 1536),
        };
        ResourceLimits {
            memory: memory.to_string(),
            cpus: cpus.to_string(),
            heap_mb,
        }
    }

    /// Trial length, if this tier expires.
    pub fn trial_period(self) -> Option<Duration> {
        match self {
            PlanTier::Free => Some(Duration::days(TRIAL_DAYS)),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard caps applied to a tenant container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// Memory limit in container-runtime notation (e.g. `1280m`, `2g`).
    pub memory: String,
    /// CPU share as a decimal string (e.g. `0.5`).
    pub cpus: String,
    /// Runtime heap ceiling in MiB.
    pub heap_mb: u32,
}

impl ResourceLimits {
    /// Value of the `NODE_OPTIONS` variable that enforces the heap ceiling.
    pub fn node_options(&self) -> String {
        format!("--max-old-space-size={}", self.heap_mb)
    }
}

// ── Instance records ──────────────────────────────────────────────

/// Persisted metadata for one provisioned tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub tenant_id: TenantId,
    pub port: u16,
    /// Public hostname routed to `port` by the reverse proxy.
    pub subdomain: String,
    pub plan: PlanTier,
    pub limits: ResourceLimits,
    /// Provider requested at provision time.
    pub ai_provider: String,
    /// Control-plane token of the tenant's own gateway.
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    /// Only set for trial tiers.
    pub expires_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Public URL of the instance.
    pub fn url(&self) -> String {
        format!("https://{}", self.subdomain)
    }

    /// Whether a trial record has passed its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_free() {
        assert_eq!(PlanTier::resolve(None), PlanTier::Free);
        assert_eq!(PlanTier::resolve(Some("platinum")), PlanTier::Free);
        assert_eq!(PlanTier::resolve(Some("pro")), PlanTier::Pro);
    }

    #[test]
    fn limits_table() {
        assert_eq!(PlanTier::Free.limits(), PlanTier::Starter.limits());
        let power = PlanTier::Power.limits();
        assert_eq!(power.memory, "2g");
        assert_eq!(power.cpus, "2.0");
        assert_eq!(power.node_options(), "--max-old-space-size=1536");
    }

    #[test]
    fn only_free_tier_expires() {
        assert_eq!(PlanTier::Free.trial_period(), Some(Duration::days(7)));
        assert!(PlanTier::Pro.trial_period().is_none());
    }

    #[test]
    fn record_serializes_camel_case() {
        let created = Utc::now();
        let record = InstanceRecord {
            tenant_id: "abc123".to_string(),
            port: 18001,
            subdomain: "abc123.1.2.3.4.nip.io".to_string(),
            plan: PlanTier::Free,
            limits: PlanTier::Free.limits(),
            ai_provider: "gemini".to_string(),
            access_token: "t".to_string(),
            created_at: created,
            expires_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tenantId"], "abc123");
        assert_eq!(json["plan"], "free");
        assert!(json["expiresAt"].is_null());
        assert_eq!(record.url(), "https://abc123.1.2.3.4.nip.io");
    }
}
