//! berth-api — REST API for Berth.
//!
//! # API Routes
//!
//! | Method | Path | Auth | Description |
//! |---|---|---|---|
//! | GET | `/health` | no | Liveness probe |
//! | POST | `/validate/telegram` | no | Check a bot token during onboarding |
//! | POST | `/provision` | yes | Provision a tenant instance |
//! | GET | `/instances` | yes | List tenant containers |
//! | GET | `/instances/{id}` | yes | Instance status |
//! | DELETE | `/instances/{id}` | yes | Deprovision (`?keepBackup=true` keeps data) |
//! | POST | `/instances/{id}/restart` | yes | Restart the container |
//! | POST | `/instances/{id}/stop` | yes | Stop the container |
//! | POST | `/instances/{id}/start` | yes | Start the container |
//! | GET | `/instances/{id}/logs` | yes | Tail output (`?lines=N`) |
//! | GET | `/instances/{id}/stats` | yes | Resource usage snapshot |
//! | POST | `/instances/{id}/upgrade` | yes | Apply a plan's limits |
//!
//! Authenticated routes expect the shared secret in `X-API-Key`.

pub mod auth;
pub mod handlers;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use berth_provision::{CredentialValidator, Provisioner};

pub use auth::API_KEY_HEADER;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub provisioner: Arc<Provisioner>,
    pub validator: Arc<dyn CredentialValidator>,
    pub api_secret: Arc<str>,
}

impl ApiState {
    pub fn new(provisioner: Provisioner, validator: Arc<dyn CredentialValidator>, api_secret: &str) -> Self {
        Self {
            provisioner: Arc::new(provisioner),
            validator,
            api_secret: Arc::from(api_secret),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/provision", post(handlers::provision))
        .route("/instances", get(handlers::list_instances))
        .route("/instances/{id}", get(handlers::get_instance).delete(handlers::delete_instance))
        .route("/instances/{id}/restart", post(handlers::restart_instance))
        .route("/instances/{id}/stop", post(handlers::stop_instance))
        .route("/instances/{id}/start", post(handlers::start_instance))
        .route("/instances/{id}/logs", get(handlers::instance_logs))
        .route("/instances/{id}/stats", get(handlers::instance_stats))
        .route("/instances/{id}/upgrade", post(handlers::upgrade_instance))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .merge(protected)
        .route("/health", get(handlers::health))
        .route("/validate/telegram", post(handlers::validate_telegram))
        .with_state(state)
}
