//! Chat-platform credential checks used during onboarding.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Identity of a bot whose token checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Outcome of a credential check. A rejected token is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid(BotIdentity),
    Invalid(String),
}

/// Checks a bot token against its platform.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// `Err` only when the platform could not be asked.
    async fn validate(&self, token: &str) -> ProvisionResult<CredentialCheck>;
}

/// Calls the Telegram Bot API `getMe` method.
pub struct TelegramValidator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramUser>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

impl TelegramValidator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProvisionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisionError::Downstream(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Bot tokens look like `<digits>:<base64url>`; anything else would be
/// spliced into the request path.
fn well_formed(token: &str) -> bool {
    match token.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty()
                && id.bytes().all(|b| b.is_ascii_digit())
                && !secret.is_empty()
                && secret
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        }
        None => false,
    }
}

#[async_trait]
impl CredentialValidator for TelegramValidator {
    async fn validate(&self, token: &str) -> ProvisionResult<CredentialCheck> {
        if !well_formed(token) {
            return Ok(CredentialCheck::Invalid("malformed bot token".to_string()));
        }

        let url = format!("{}/bot{token}/getMe", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProvisionError::Timeout(format!("telegram getMe timed out: {e}"))
            } else {
                ProvisionError::Downstream(format!("telegram getMe: {e}"))
            }
        })?;
        let status = response.status();
        // Telegram answers rejected tokens with a 401 and a JSON body.
        let body: GetMeResponse = response
            .json()
            .await
            .map_err(|e| ProvisionError::Downstream(format!("telegram getMe ({status}): {e}")))?;
        debug!(%status, ok = body.ok, "telegram getMe answered");

        match (body.ok, body.result) {
            (true, Some(user)) => Ok(CredentialCheck::Valid(BotIdentity {
                id: user.id,
                username: user.username,
                first_name: user.first_name,
            })),
            _ => Ok(CredentialCheck::Invalid(
                body.description.unwrap_or_else(|| "token rejected".to_string()),
            )),
        }
    }
}
