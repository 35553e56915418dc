//! Provisioning orchestrator.
//!
//! Brings a tenant instance into existence by composing the port
//! registry, the container runtime, the route synchronizer, and the
//! instance record store, in that order:
//!
//! 1. allocate a port (the registry lock is held until step 7); a tenant
//!    seen before gets its old port back
//! 2. resolve the plan tier to resource limits
//! 3. generate the tenant's gateway token
//! 4. build the tenant app config
//! 5. write it to the tenant's private directory
//! 6. create and start the container
//! 7. commit the port allocation
//! 8. add the proxy route and reload
//! 9. store the instance record
//!
//! The conflict check is repeated once the registry lock is held, so of two
//! concurrent requests for one tenant the second sees the first's
//! container. A failure after step 1 removes the container and the tenant
//! directory created by this attempt, and puts back the `openclaw.json` of
//! a directory kept from an earlier deprovision. Cleanup failures are
//! logged, never returned.

use std::path::PathBuf;
use std::sync::Arc;

use berth_proxy::RouteSync;
use berth_runtime::{ContainerRuntime, ContainerSummary, RunSpec, RuntimeError};
use berth_state::{InstanceRecord, PlanTier, PortLease, PortRegistry, StateError, StateStore};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app_config::{AppConfig, DEFAULT_PROVIDER, ProviderDefaults, select_provider};
use crate::error::{ProvisionError, ProvisionResult};
use crate::tenant::{generate_access_token, validate_tenant_id};
use crate::workspace::{TenantOwner, TenantWorkspace};

/// Static settings for every tenant container.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Parent of all tenant directories.
    pub instances_dir: PathBuf,
    pub image: String,
    /// Container names are `{container_prefix}{tenant_id}`.
    pub container_prefix: String,
    /// Port the agent's gateway listens on inside the container.
    pub container_port: u16,
    /// Where the tenant directory is mounted inside the container.
    pub config_mount: String,
    pub restart_policy: Option<String>,
    pub tenant_owner: Option<TenantOwner>,
    pub providers: ProviderDefaults,
}

impl ProvisionSettings {
    pub fn new(instances_dir: impl Into<PathBuf>) -> Self {
        Self {
            instances_dir: instances_dir.into(),
            image: "ghcr.io/openclaw/openclaw:latest".to_string(),
            container_prefix: "openclaw-".to_string(),
            container_port: 18789,
            config_mount: "/home/node/.openclaw".to_string(),
            restart_policy: Some("unless-stopped".to_string()),
            tenant_owner: None,
            providers: ProviderDefaults::default(),
        }
    }
}

/// A request to provision one tenant.
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub tenant_id: String,
    pub bot_token: String,
    pub ai_provider: Option<String>,
    pub api_key: Option<String>,
    pub owner_ids: Vec<String>,
    pub plan: Option<String>,
}

/// What the caller needs to reach a freshly provisioned tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    pub tenant_id: String,
    pub subdomain: String,
    pub url: String,
    pub port: u16,
    pub access_token: String,
    pub plan: PlanTier,
}

/// Status of one tenant as seen by the runtime and the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub tenant_id: String,
    pub status: String,
    pub started_at: String,
    pub port: Option<u16>,
    pub subdomain: Option<String>,
    pub url: Option<String>,
    pub plan: PlanTier,
    /// Whether the tenant's trial has run out.
    pub expired: bool,
}

/// Side effects of one provisioning attempt that cleanup must undo.
#[derive(Debug, Default)]
struct Progress {
    workspace_created: bool,
    /// `openclaw.json` of a directory that predates this attempt.
    previous_config: Option<Vec<u8>>,
    container_requested: bool,
}

/// Creates, tears down, and controls tenant instances.
pub struct Provisioner {
    pub(crate) settings: ProvisionSettings,
    pub(crate) store: StateStore,
    pub(crate) ports: PortRegistry,
    pub(crate) routes: Arc<RouteSync>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
}

impl Provisioner {
    pub fn new(
        settings: ProvisionSettings,
        store: StateStore,
        ports: PortRegistry,
        routes: Arc<RouteSync>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            settings,
            store,
            ports,
            routes,
            runtime,
        }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    pub fn routes(&self) -> &RouteSync {
        &self.routes
    }

    pub fn container_name(&self, tenant_id: &str) -> String {
        format!("{}{}", self.settings.container_prefix, tenant_id)
    }

    pub fn workspace(&self, tenant_id: &str) -> TenantWorkspace {
        TenantWorkspace::new(&self.settings.instances_dir, tenant_id)
    }

    /// Provision a new tenant instance.
    pub async fn provision(&self, request: ProvisionRequest) -> ProvisionResult<ProvisionOutcome> {
        if request.tenant_id.is_empty() || request.bot_token.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "tenant_id and bot_token are required".to_string(),
            ));
        }
        validate_tenant_id(&request.tenant_id)?;

        let tenant_id = request.tenant_id.as_str();
        let name = self.container_name(tenant_id);
        self.ensure_absent(tenant_id, &name).await?;

        let lease = self.ports.allocate(tenant_id).await?;
        // A concurrent request may have created the container while we
        // waited for the lease.
        self.ensure_absent(tenant_id, &name).await?;
        // Fails while the public address is unknown or the subdomain is
        // routed elsewhere.
        self.routes.check_route(tenant_id, lease.port()).await?;

        let workspace = self.workspace(tenant_id);
        let mut progress = Progress::default();

        match self
            .provision_steps(&request, &name, lease, &workspace, &mut progress)
            .await
        {
            Ok(outcome) => {
                info!(
                    %tenant_id,
                    port = outcome.port,
                    subdomain = %outcome.subdomain,
                    plan = %outcome.plan,
                    "tenant provisioned"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(%tenant_id, error = %e, "provisioning failed, cleaning up");
                self.clean_up(tenant_id, &name, &workspace, &progress).await;
                Err(e)
            }
        }
    }

    async fn ensure_absent(&self, tenant_id: &str, name: &str) -> ProvisionResult<()> {
        if self.runtime.inspect(name).await?.is_some() {
            return Err(ProvisionError::Conflict(tenant_id.to_string()));
        }
        Ok(())
    }

    async fn provision_steps(
        &self,
        request: &ProvisionRequest,
        name: &str,
        lease: PortLease,
        workspace: &TenantWorkspace,
        progress: &mut Progress,
    ) -> ProvisionResult<ProvisionOutcome> {
        let tenant_id = request.tenant_id.as_str();
        let port = lease.port();
        debug!(%tenant_id, port, reused = lease.is_reused(), "port reserved");

        let plan = PlanTier::resolve(request.plan.as_deref());
        let limits = plan.limits();
        let access_token = generate_access_token();

        let provider = select_provider(
            request.ai_provider.as_deref(),
            request.api_key.as_deref(),
            &self.settings.providers,
        );
        let config = AppConfig::build(
            &request.bot_token,
            provider.as_ref(),
            &request.owner_ids,
            self.settings.container_port,
            &access_token,
        );

        progress.workspace_created = workspace.create().await?;
        if !progress.workspace_created {
            progress.previous_config = workspace.read_config_bytes().await?;
        }
        workspace.write_config(&config).await?;
        workspace.restrict(self.settings.tenant_owner).await?;

        let spec = RunSpec {
            name: name.to_string(),
            image: self.settings.image.clone(),
            volume_host: workspace.path().display().to_string(),
            volume_container: self.settings.config_mount.clone(),
            host_port: port,
            container_port: self.settings.container_port,
            memory: limits.memory.clone(),
            cpus: limits.cpus.clone(),
            env: vec![("NODE_OPTIONS".to_string(), limits.node_options())],
            restart: self.settings.restart_policy.clone(),
        };
        let run = self.runtime.run(&spec).await;
        // A taken name belongs to somebody else's container.
        progress.container_requested = !matches!(run, Err(RuntimeError::NameInUse(_)));
        run.map_err(|e| match e {
            RuntimeError::NameInUse(_) => ProvisionError::Conflict(tenant_id.to_string()),
            e => e.into(),
        })?;

        lease.commit()?;

        let subdomain = self.routes.add_route(tenant_id, port).await?;

        let created_at = Utc::now();
        let record = InstanceRecord {
            tenant_id: tenant_id.to_string(),
            port,
            subdomain,
            plan,
            limits,
            ai_provider: request
                .ai_provider
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            access_token,
            created_at,
            expires_at: plan.trial_period().map(|trial| created_at + trial),
        };
        self.store.put_instance(&record)?;

        Ok(ProvisionOutcome {
            tenant_id: record.tenant_id.clone(),
            url: record.url(),
            subdomain: record.subdomain,
            port,
            access_token: record.access_token,
            plan,
        })
    }

    async fn clean_up(&self, tenant_id: &str, name: &str, workspace: &TenantWorkspace, progress: &Progress) {
        if progress.container_requested {
            if let Err(e) = self.runtime.remove(name).await {
                warn!(%tenant_id, container = %name, error = %e, "cleanup: container removal failed");
            }
        }
        if progress.workspace_created {
            if let Err(e) = workspace.purge().await {
                warn!(%tenant_id, path = ?workspace.path(), error = %e, "cleanup: directory removal failed");
            }
        } else if let Some(previous) = &progress.previous_config {
            if let Err(e) = workspace.write_config_bytes(previous).await {
                warn!(%tenant_id, path = ?workspace.config_path(), error = %e, "cleanup: config restore failed");
            }
        }
    }

    /// Remove a tenant's container, and unless `keep_backup` is set, its
    /// private directory and instance record.
    ///
    /// The port allocation and the proxy route are left in place, so the
    /// port is never handed to another tenant.
    pub async fn deprovision(&self, tenant_id: &str, keep_backup: bool) -> ProvisionResult<()> {
        validate_tenant_id(tenant_id)?;
        let name = self.container_name(tenant_id);
        self.runtime.remove(&name).await?;

        if !keep_backup {
            self.workspace(tenant_id).purge().await?;
            self.store.delete_instance(tenant_id)?;
        }
        info!(%tenant_id, keep_backup, "tenant deprovisioned");
        Ok(())
    }

    /// Live status of one tenant. Missing stores degrade to defaults; a
    /// missing container is `NotFound`.
    pub async fn status(&self, tenant_id: &str) -> ProvisionResult<InstanceStatus> {
        validate_tenant_id(tenant_id)?;
        let name = self.container_name(tenant_id);
        let state = self
            .runtime
            .inspect(&name)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(tenant_id.to_string()))?;

        let record = match self.store.get_instance(tenant_id) {
            Ok(record) => Some(record),
            Err(StateError::NotFound(_)) => None,
            Err(e) => {
                warn!(%tenant_id, error = %e, "instance record unreadable");
                None
            }
        };
        let port = self.ports.lookup(tenant_id);
        let subdomain = match (&record, port) {
            (Some(record), _) => Some(record.subdomain.clone()),
            (None, Some(_)) => self.routes.subdomain_for(tenant_id).ok(),
            (None, None) => None,
        };

        Ok(InstanceStatus {
            tenant_id: tenant_id.to_string(),
            status: state.status,
            started_at: state.started_at,
            port,
            url: subdomain.as_ref().map(|s| format!("https://{s}")),
            subdomain,
            expired: record.as_ref().is_some_and(|r| r.is_expired(Utc::now())),
            plan: record.map(|r| r.plan).unwrap_or_default(),
        })
    }

    /// All tenant containers known to the runtime.
    pub async fn list(&self) -> ProvisionResult<Vec<ContainerSummary>> {
        Ok(self.runtime.list(&self.settings.container_prefix).await?)
    }
}
