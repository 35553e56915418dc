//! berth-provision — tenant provisioning for Berth.
//!
//! [`Provisioner`] composes the port registry, the container runtime, the
//! route synchronizer, and the instance record store into the two
//! multi-step operations (`provision`, `deprovision`) plus the thin
//! lifecycle controls (start, stop, restart, logs, stats, upgrade).
//!
//! Also home to the pieces each tenant needs before its container starts:
//! the agent config document, the tenant-private directory, and the
//! onboarding-time bot token check.

pub mod app_config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod provisioner;
pub mod tenant;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use app_config::{AppConfig, ProviderDefaults, ProviderSelection, select_provider};
pub use credentials::{BotIdentity, CredentialCheck, CredentialValidator, TELEGRAM_API_URL, TelegramValidator};
pub use error::{ProvisionError, ProvisionResult};
pub use lifecycle::{MAX_LOG_LINES, UpgradeOutcome};
pub use provisioner::{InstanceStatus, ProvisionOutcome, ProvisionRequest, ProvisionSettings, Provisioner};
pub use tenant::{generate_access_token, generate_tenant_id, validate_tenant_id};
pub use workspace::{TenantOwner, TenantWorkspace};
