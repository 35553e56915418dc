//! REST API handlers.
//!
//! Each handler calls into the `Provisioner` and answers with JSON.
//! Failures always carry an `error` field.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use berth_provision::{CredentialCheck, ProvisionError, ProvisionRequest, generate_tenant_id};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::ApiState;

/// Log lines returned when the caller does not say.
pub const DEFAULT_LOG_LINES: u32 = 100;

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: msg.to_string(),
        }),
    )
}

fn status_for(e: &ProvisionError) -> StatusCode {
    match e {
        ProvisionError::Validation(_) => StatusCode::BAD_REQUEST,
        ProvisionError::Conflict(_) => StatusCode::CONFLICT,
        ProvisionError::NotFound(_) => StatusCode::NOT_FOUND,
        ProvisionError::Downstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ProvisionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn provision_error(e: ProvisionError) -> axum::response::Response {
    let status = status_for(&e);
    if status.is_server_error() {
        warn!(%status, error = %e, "request failed downstream");
    }
    error_response(&e.to_string(), status).into_response()
}

fn bad_json(rejection: JsonRejection) -> axum::response::Response {
    error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response()
}

fn bad_query(rejection: QueryRejection) -> axum::response::Response {
    error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response()
}

fn success(message: &str) -> axum::response::Response {
    Json(json!({ "success": true, "message": message })).into_response()
}

// ── Unauthenticated ────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateTelegramBody {
    #[serde(default)]
    pub token: Option<String>,
}

/// POST /validate/telegram
pub async fn validate_telegram(
    State(state): State<ApiState>,
    body: Result<Json<ValidateTelegramBody>, JsonRejection>,
) -> impl IntoResponse {
    let token = match body {
        Ok(Json(ValidateTelegramBody { token: Some(token) })) if !token.trim().is_empty() => token,
        Ok(_) => return error_response("token is required", StatusCode::BAD_REQUEST).into_response(),
        Err(rejection) => return bad_json(rejection),
    };

    match state.validator.validate(token.trim()).await {
        Ok(CredentialCheck::Valid(bot)) => Json(json!({ "valid": true, "bot": bot })).into_response(),
        Ok(CredentialCheck::Invalid(reason)) => {
            Json(json!({ "valid": false, "error": reason })).into_response()
        }
        Err(e) => provision_error(e),
    }
}

// ── Provisioning ───────────────────────────────────────────────

/// Owner IDs arrive as numbers or strings; the agent config wants strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OwnerId {
    Number(i64),
    Text(String),
}

impl OwnerId {
    fn into_string(self) -> String {
        match self {
            OwnerId::Number(n) => n.to_string(),
            OwnerId::Text(s) => s,
        }
    }
}

/// Provision request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionBody {
    #[serde(default, alias = "tenantId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub telegram_token: Option<String>,
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub owner_ids: Vec<OwnerId>,
    #[serde(default)]
    pub plan: Option<String>,
}

impl ProvisionBody {
    fn into_request(self) -> ProvisionRequest {
        let tenant_id = self
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_tenant_id);
        ProvisionRequest {
            tenant_id,
            bot_token: self.telegram_token.unwrap_or_default(),
            ai_provider: self.ai_provider.filter(|p| !p.is_empty()),
            api_key: self.api_key,
            owner_ids: self.owner_ids.into_iter().map(OwnerId::into_string).collect(),
            plan: self.plan,
        }
    }
}

/// POST /provision
pub async fn provision(
    State(state): State<ApiState>,
    body: Result<Json<ProvisionBody>, JsonRejection>,
) -> impl IntoResponse {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return bad_json(rejection),
    };

    match state.provisioner.provision(body.into_request()).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => provision_error(e),
    }
}

// ── Instances ──────────────────────────────────────────────────

/// GET /instances
pub async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    match state.provisioner.list().await {
        Ok(instances) => Json(json!({ "instances": instances })).into_response(),
        Err(e) => provision_error(e),
    }
}

/// GET /instances/{id}
pub async fn get_instance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.provisioner.status(&id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => provision_error(e),
    }
}

/// POST /instances/{id}/restart
pub async fn restart_instance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.provisioner.restart(&id).await {
        Ok(()) => success("Instance restarted"),
        Err(e) => provision_error(e),
    }
}

/// POST /instances/{id}/stop
pub async fn stop_instance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.provisioner.stop(&id).await {
        Ok(()) => success("Instance stopped"),
        Err(e) => provision_error(e),
    }
}

/// POST /instances/{id}/start
pub async fn start_instance(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.provisioner.start(&id).await {
        Ok(()) => success("Instance started"),
        Err(e) => provision_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    #[serde(default)]
    pub keep_backup: Option<String>,
}

/// DELETE /instances/{id}?keepBackup=true
pub async fn delete_instance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return bad_query(rejection),
    };
    let keep_backup = params.keep_backup.as_deref() == Some("true");
    match state.provisioner.deprovision(&id, keep_backup).await {
        Ok(()) => success("Instance deleted"),
        Err(e) => provision_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    #[serde(default)]
    pub lines: Option<u32>,
}

/// GET /instances/{id}/logs?lines=N
pub async fn instance_logs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return bad_query(rejection),
    };
    let lines = params.lines.unwrap_or(DEFAULT_LOG_LINES);
    match state.provisioner.logs(&id, lines).await {
        Ok(logs) => Json(json!({ "logs": logs })).into_response(),
        Err(e) => provision_error(e),
    }
}

/// GET /instances/{id}/stats
pub async fn instance_stats(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.provisioner.stats(&id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => provision_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpgradeBody {
    #[serde(default)]
    pub plan: Option<String>,
}

/// POST /instances/{id}/upgrade
pub async fn upgrade_instance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<UpgradeBody>, JsonRejection>,
) -> impl IntoResponse {
    let plan = match body {
        Ok(Json(UpgradeBody { plan: Some(plan) })) => plan,
        Ok(_) => return error_response("plan is required", StatusCode::BAD_REQUEST).into_response(),
        Err(rejection) => return bad_json(rejection),
    };

    match state.provisioner.upgrade(&id, &plan).await {
        Ok(outcome) => Json(json!({
            "success": true,
            "message": format!("Upgraded to {}", outcome.plan),
            "plan": outcome.plan,
            "memory": outcome.memory,
            "cpus": outcome.cpus,
        }))
        .into_response(),
        Err(e) => provision_error(e),
    }
}
