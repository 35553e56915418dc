//! Handler test fixture: a provisioner over fakes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use berth_provision::{
    BotIdentity, CredentialCheck, CredentialValidator, ProvisionResult, ProvisionSettings, Provisioner,
};
use berth_proxy::{DEFAULT_DOMAIN_SUFFIX, PublicHost, RouteSync, ScriptedReloader};
use berth_runtime::FakeRuntime;
use berth_state::{DEFAULT_BASE_PORT, PortRegistry, StateStore};
use tempfile::TempDir;

use crate::ApiState;

pub(crate) const SECRET: &str = "test-secret";

/// Accepts exactly `123:good`.
pub(crate) struct StubValidator;

#[async_trait]
impl CredentialValidator for StubValidator {
    async fn validate(&self, token: &str) -> ProvisionResult<CredentialCheck> {
        if token == "123:good" {
            Ok(CredentialCheck::Valid(BotIdentity {
                id: 1,
                username: Some("berth_bot".to_string()),
                first_name: Some("Berth".to_string()),
            }))
        } else {
            Ok(CredentialCheck::Invalid("Unauthorized".to_string()))
        }
    }
}

pub(crate) struct TestApi {
    pub state: ApiState,
    pub runtime: Arc<FakeRuntime>,
    _dir: TempDir,
}

impl TestApi {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().unwrap();
        let ports = PortRegistry::new(store.clone(), DEFAULT_BASE_PORT);
        let host = PublicHost::resolved(Ipv4Addr::new(34, 1, 2, 3), DEFAULT_DOMAIN_SUFFIX);
        let routes = Arc::new(RouteSync::new(
            dir.path().join("Caddyfile"),
            host,
            Arc::new(ScriptedReloader::ok()),
        ));
        let runtime = Arc::new(FakeRuntime::new());
        let provisioner = Provisioner::new(
            ProvisionSettings::new(dir.path().join("instances")),
            store,
            ports,
            routes,
            runtime.clone(),
        );

        let state = ApiState::new(provisioner, Arc::new(StubValidator), SECRET);
        Self {
            state,
            runtime,
            _dir: dir,
        }
    }
}
