//! API regression tests.
//!
//! Drives the full router over a fake container runtime, an in-memory
//! state store, and a real Caddyfile in a temp directory: provisioning,
//! status, lifecycle control, upgrades, and teardown.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use berth_api::{API_KEY_HEADER, ApiState, build_router};
use berth_provision::{ProvisionSettings, Provisioner, TelegramValidator};
use berth_proxy::{DEFAULT_DOMAIN_SUFFIX, PublicHost, RouteSync, ScriptedReloader};
use berth_runtime::{FakeRuntime, Op};
use berth_state::{DEFAULT_BASE_PORT, PortRegistry, StateStore};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "regression-secret";

struct Daemon {
    router: Router,
    runtime: Arc<FakeRuntime>,
    reloader: Arc<ScriptedReloader>,
    store: StateStore,
    dir: TempDir,
}

impl Daemon {
    fn start() -> Self {
        Self::with_host(PublicHost::resolved(Ipv4Addr::new(34, 1, 2, 3), DEFAULT_DOMAIN_SUFFIX))
    }

    fn with_host(host: PublicHost) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().unwrap();
        let ports = PortRegistry::new(store.clone(), DEFAULT_BASE_PORT);
        let reloader = Arc::new(ScriptedReloader::ok());
        let routes = Arc::new(RouteSync::new(dir.path().join("Caddyfile"), host, reloader.clone()));
        let runtime = Arc::new(FakeRuntime::new());
        let provisioner = Provisioner::new(
            ProvisionSettings::new(dir.path().join("instances")),
            store.clone(),
            ports,
            routes,
            runtime.clone(),
        );
        // Unroutable: only malformed tokens are checked, which never leave the process.
        let validator = TelegramValidator::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let router = build_router(ApiState::new(provisioner, Arc::new(validator), SECRET));
        Self {
            router,
            runtime,
            reloader,
            store,
            dir,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, SECRET);
        let body = match body {
            Some(value) => {
                req = req.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        let resp = self.router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn provision(&self, user_id: &str, plan: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/provision",
            Some(json!({
                "userId": user_id,
                "telegramToken": "123:abc",
                "aiProvider": "gemini",
                "apiKey": "gem-key",
                "ownerIds": [42],
                "plan": plan,
            })),
        )
        .await
    }

    fn caddyfile(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("Caddyfile")).unwrap_or_default()
    }
}

#[tokio::test]
async fn provision_free_tenant_end_to_end() {
    let d = Daemon::start();

    let (status, body) = d.provision("abc123", "free").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["port"], 18001);
    assert_eq!(body["subdomain"], "abc123.34.1.2.3.nip.io");
    assert_eq!(body["url"], "https://abc123.34.1.2.3.nip.io");

    assert!(
        d.caddyfile()
            .contains("\nabc123.34.1.2.3.nip.io {\n    reverse_proxy localhost:18001\n}\n")
    );
    assert_eq!(d.reloader.calls(), 1);

    let record = d.store.get_instance("abc123").unwrap();
    assert_eq!(record.expires_at, Some(record.created_at + chrono::Duration::days(7)));

    let config: Value = serde_json::from_slice(
        &std::fs::read(d.dir.path().join("instances/abc123/openclaw.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(config["channels"]["telegram"]["allowFrom"], json!(["42"]));
    assert_eq!(config["gateway"]["auth"]["token"], body["access_token"]);
}

#[tokio::test]
async fn back_to_back_tenants_get_sequential_ports() {
    let d = Daemon::start();
    let (_, a) = d.provision("tenant-a", "pro").await;
    let (_, b) = d.provision("tenant-b", "power").await;
    assert_eq!(a["port"], 18001);
    assert_eq!(b["port"], 18002);

    let (status, body) = d.call("GET", "/instances", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["instances"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["tenant_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["tenant-a", "tenant-b"]);
}

#[tokio::test]
async fn concurrent_provisions_never_share_a_port() {
    let d = Daemon::start();
    let (a, b, c, e) = tokio::join!(
        d.provision("c1", "free"),
        d.provision("c2", "free"),
        d.provision("c3", "free"),
        d.provision("c4", "free"),
    );
    let mut ports: Vec<u64> = [a, b, c, e]
        .iter()
        .map(|(status, body)| {
            assert_eq!(*status, StatusCode::CREATED);
            body["port"].as_u64().unwrap()
        })
        .collect();
    ports.sort();
    assert_eq!(ports, vec![18001, 18002, 18003, 18004]);
}

#[tokio::test]
async fn duplicate_provision_conflicts_without_side_effects() {
    let d = Daemon::start();
    d.provision("abc123", "free").await;
    let caddy_before = d.caddyfile();

    let (status, body) = d.provision("abc123", "free").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
    assert_eq!(d.caddyfile(), caddy_before);
    assert_eq!(d.reloader.calls(), 1);
}

#[tokio::test]
async fn missing_token_is_rejected_before_any_runtime_call() {
    let d = Daemon::start();
    let (status, body) = d
        .call("POST", "/provision", Some(json!({ "userId": "abc123" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("required"));
    assert_eq!(d.runtime.call_count(), 0);
}

#[tokio::test]
async fn reload_failure_rolls_back_container_and_directory() {
    let d = Daemon::start();
    d.reloader.set_failure(Some("caddy: admin endpoint disabled"));

    let (status, body) = d.provision("abc123", "free").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("admin endpoint disabled"));
    assert!(d.runtime.container("openclaw-abc123").is_none());
    assert!(!d.dir.path().join("instances/abc123").exists());

    let (status, _) = d.call("GET", "/instances/abc123", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unresolved_host_fails_provisioning_explicitly() {
    let d = Daemon::with_host(PublicHost::unresolved(DEFAULT_DOMAIN_SUFFIX));
    let (status, body) = d.provision("abc123", "free").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("not resolved"));
    assert!(d.runtime.container_names().is_empty());
    assert_eq!(d.caddyfile(), "");
}

#[tokio::test]
async fn runtime_timeout_is_gateway_timeout() {
    let d = Daemon::start();
    d.runtime.time_out_on(Op::Run);
    let (status, _) = d.provision("slow", "free").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn lifecycle_round() {
    let d = Daemon::start();
    d.provision("abc123", "starter").await;

    let (status, body) = d.call("POST", "/instances/abc123/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Instance stopped" }));

    let (_, body) = d.call("GET", "/instances/abc123", None).await;
    assert_eq!(body["status"], "exited");
    assert_eq!(body["plan"], "starter");

    let (status, _) = d.call("POST", "/instances/abc123/start", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = d.call("POST", "/instances/abc123/restart", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = d.call("GET", "/instances/abc123/logs?lines=1", None).await;
    assert_eq!(body["logs"], "openclaw-abc123 line 1\n");

    let (_, body) = d.call("GET", "/instances/abc123/stats", None).await;
    assert_eq!(body["memory"], "100MiB / 1280m");

    let (status, body) = d
        .call("POST", "/instances/abc123/upgrade", Some(json!({ "plan": "power" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory"], "2g");
    assert_eq!(body["cpus"], "2.0");

    let (_, body) = d.call("GET", "/instances/abc123", None).await;
    assert_eq!(body["plan"], "power");
    assert_eq!(d.runtime.container("openclaw-abc123").unwrap().restarts, 1);
}

#[tokio::test]
async fn delete_keeps_port_and_route() {
    let d = Daemon::start();
    d.provision("abc123", "free").await;

    let (status, body) = d.call("DELETE", "/instances/abc123", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(!d.dir.path().join("instances/abc123").exists());

    let (status, _) = d.call("GET", "/instances/abc123", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let ports = PortRegistry::new(d.store.clone(), DEFAULT_BASE_PORT);
    assert_eq!(ports.lookup("abc123"), Some(18001));
    assert!(d.caddyfile().contains("localhost:18001"));

    let (_, body) = d.provision("next", "free").await;
    assert_eq!(body["port"], 18002);
}

#[tokio::test]
async fn delete_with_backup_keeps_directory() {
    let d = Daemon::start();
    d.provision("abc123", "free").await;

    let (status, _) = d
        .call("DELETE", "/instances/abc123?keepBackup=true", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(d.dir.path().join("instances/abc123/openclaw.json").exists());
}

#[tokio::test]
async fn reprovision_after_delete_keeps_one_route() {
    let d = Daemon::start();
    d.provision("abc123", "free").await;
    d.call("DELETE", "/instances/abc123", None).await;

    let (status, body) = d.provision("abc123", "free").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["port"], 18001);
    assert_eq!(d.caddyfile().matches("abc123.34.1.2.3.nip.io {").count(), 1);

    let (_, body) = d.call("GET", "/instances/abc123", None).await;
    assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn racing_provisions_leave_the_winner_running() {
    let d = Daemon::start();
    let ((a, _), (b, _)) = tokio::join!(d.provision("dup", "free"), d.provision("dup", "free"));

    let mut statuses = vec![a, b];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
    assert!(d.runtime.container("openclaw-dup").is_some());

    let (status, body) = d.call("GET", "/instances/dup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn bad_query_string_is_json_error() {
    let d = Daemon::start();
    d.provision("abc123", "free").await;

    let (status, body) = d.call("GET", "/instances/abc123/logs?lines=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("lines"));
}

#[tokio::test]
async fn operator_routes_require_key() {
    let d = Daemon::start();
    let req = Request::builder()
        .method("DELETE")
        .uri("/instances/abc123")
        .body(Body::empty())
        .unwrap();
    let resp = d.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(d.runtime.call_count(), 0);
}

#[tokio::test]
async fn health_and_token_validation_are_public() {
    let d = Daemon::start();

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = d.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/validate/telegram")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"token":"not-a-token"}"#))
        .unwrap();
    let resp = d.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["valid"], false);
}
