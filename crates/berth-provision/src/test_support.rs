//! Shared fixture for orchestrator tests.

use std::net::Ipv4Addr;
use std::sync::Arc;

use berth_proxy::{DEFAULT_DOMAIN_SUFFIX, PublicHost, RouteSync, ScriptedReloader};
use berth_runtime::FakeRuntime;
use berth_state::{DEFAULT_BASE_PORT, PortRegistry, StateStore};
use tempfile::TempDir;

use crate::provisioner::{ProvisionSettings, Provisioner};

pub(crate) struct Harness {
    pub provisioner: Provisioner,
    pub runtime: Arc<FakeRuntime>,
    pub reloader: Arc<ScriptedReloader>,
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().unwrap();
        let ports = PortRegistry::new(store.clone(), DEFAULT_BASE_PORT);
        let reloader = Arc::new(ScriptedReloader::ok());
        let host = PublicHost::resolved(Ipv4Addr::new(34, 1, 2, 3), DEFAULT_DOMAIN_SUFFIX);
        let routes = Arc::new(RouteSync::new(dir.path().join("Caddyfile"), host, reloader.clone()));
        let runtime = Arc::new(FakeRuntime::new());

        let settings = ProvisionSettings::new(dir.path().join("instances"));
        let provisioner = Provisioner::new(settings, store, ports, routes, runtime.clone());
        Self {
            provisioner,
            runtime,
            reloader,
            dir,
        }
    }

    pub fn caddyfile(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("Caddyfile")).unwrap_or_default()
    }
}
