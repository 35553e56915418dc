//! Shared-secret authentication for operator routes.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::ApiState;
use crate::handlers::error_response;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-API-Key` header does not match the secret.
pub async fn require_api_key(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if secret_matches(key, &state.api_secret) => next.run(request).await,
        _ => {
            debug!(path = %request.uri().path(), "rejected request without valid API key");
            error_response("unauthorized", StatusCode::UNAUTHORIZED).into_response()
        }
    }
}

fn secret_matches(presented: &str, secret: &str) -> bool {
    presented.as_bytes().ct_eq(secret.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_whole_secret() {
        assert!(secret_matches("s3cret", "s3cret"));
        assert!(!secret_matches("s3cre", "s3cret"));
        assert!(!secret_matches("s3cret!", "s3cret"));
        assert!(!secret_matches("", "s3cret"));
    }
}
