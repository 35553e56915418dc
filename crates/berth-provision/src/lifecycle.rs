//! Pass-through lifecycle control of provisioned tenants.
//!
//! Each operation goes straight to the container runtime. None of them
//! touch the port registry; only a successful `upgrade` updates the
//! stored plan.

use berth_runtime::{ContainerStats, RuntimeError};
use berth_state::{PlanTier, StateError};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioner::Provisioner;
use crate::tenant::validate_tenant_id;

/// Upper bound on `logs` line counts.
pub const MAX_LOG_LINES: u32 = 10_000;

/// Limits applied by a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeOutcome {
    pub plan: PlanTier,
    pub memory: String,
    pub cpus: String,
}

impl Provisioner {
    pub async fn restart(&self, tenant_id: &str) -> ProvisionResult<()> {
        let name = self.checked_name(tenant_id)?;
        self.runtime.restart(&name).await.map_err(|e| tenant_error(tenant_id, e))?;
        info!(%tenant_id, "instance restarted");
        Ok(())
    }

    pub async fn stop(&self, tenant_id: &str) -> ProvisionResult<()> {
        let name = self.checked_name(tenant_id)?;
        self.runtime.stop(&name).await.map_err(|e| tenant_error(tenant_id, e))?;
        info!(%tenant_id, "instance stopped");
        Ok(())
    }

    pub async fn start(&self, tenant_id: &str) -> ProvisionResult<()> {
        let name = self.checked_name(tenant_id)?;
        self.runtime.start(&name).await.map_err(|e| tenant_error(tenant_id, e))?;
        info!(%tenant_id, "instance started");
        Ok(())
    }

    /// The last `lines` lines of the tenant's output, capped at
    /// [`MAX_LOG_LINES`].
    pub async fn logs(&self, tenant_id: &str, lines: u32) -> ProvisionResult<String> {
        let name = self.checked_name(tenant_id)?;
        self.runtime
            .logs(&name, lines.clamp(1, MAX_LOG_LINES))
            .await
            .map_err(|e| tenant_error(tenant_id, e))
    }

    pub async fn stats(&self, tenant_id: &str) -> ProvisionResult<ContainerStats> {
        let name = self.checked_name(tenant_id)?;
        self.runtime
            .stats(&name)
            .await
            .map_err(|e| tenant_error(tenant_id, e))
    }

    /// Apply `plan`'s limits to the live container without restarting it.
    pub async fn upgrade(&self, tenant_id: &str, plan: &str) -> ProvisionResult<UpgradeOutcome> {
        let name = self.checked_name(tenant_id)?;
        let tier = PlanTier::from_name(plan)
            .ok_or_else(|| ProvisionError::Validation(format!("invalid plan: {plan:?}")))?;
        let limits = tier.limits();

        self.runtime
            .update_limits(&name, &limits.memory, &limits.cpus)
            .await
            .map_err(|e| tenant_error(tenant_id, e))?;
        info!(%tenant_id, plan = %tier, memory = %limits.memory, cpus = %limits.cpus, "instance upgraded");

        match self.store.get_instance(tenant_id) {
            Ok(mut record) => {
                record.plan = tier;
                record.limits = limits.clone();
                if let Err(e) = self.store.put_instance(&record) {
                    warn!(%tenant_id, error = %e, "upgraded limits not recorded");
                }
            }
            Err(StateError::NotFound(_)) => {}
            Err(e) => warn!(%tenant_id, error = %e, "instance record unreadable"),
        }

        Ok(UpgradeOutcome {
            plan: tier,
            memory: limits.memory,
            cpus: limits.cpus,
        })
    }

    fn checked_name(&self, tenant_id: &str) -> ProvisionResult<String> {
        validate_tenant_id(tenant_id)?;
        Ok(self.container_name(tenant_id))
    }
}

/// Report a missing container under the tenant's ID rather than the
/// runtime's wording.
fn tenant_error(tenant_id: &str, e: RuntimeError) -> ProvisionError {
    match e {
        RuntimeError::NotFound(_) => ProvisionError::NotFound(tenant_id.to_string()),
        e => e.into(),
    }
}
