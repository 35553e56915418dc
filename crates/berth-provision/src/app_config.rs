//! The tenant agent's `openclaw.json`.
//!
//! Each tenant container reads its chat channel, model, and gateway
//! settings from this document. The shape is fixed by the agent image;
//! field names below serialize to the exact keys it expects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Model used when no provider key can be found.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-5";

/// Provider recorded when the request names none.
pub const DEFAULT_PROVIDER: &str = "groq";

/// Service-wide provider keys used when a request brings none.
#[derive(Debug, Clone, Default)]
pub struct ProviderDefaults {
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
}

/// The credential and model chosen for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub env_var: &'static str,
    pub api_key: String,
    pub model: &'static str,
}

const GEMINI: (&str, &str) = ("GEMINI_API_KEY", "google/gemini-2.0-flash");
const GROQ: (&str, &str) = ("GROQ_API_KEY", "groq/gemma2-9b-it");
const ANTHROPIC: (&str, &str) = ("ANTHROPIC_API_KEY", "anthropic/claude-sonnet-4-5");
const OPENAI: (&str, &str) = ("OPENAI_API_KEY", "openai/gpt-4o");
const OPENROUTER: (&str, &str) = ("OPENROUTER_API_KEY", "openrouter/google/gemini-2.0-flash-exp:free");

/// Pick the provider credential for a tenant.
///
/// An explicitly requested provider wins when a key is available for it,
/// either from the request or, for Gemini and Groq, from the service
/// defaults. Otherwise the service's Gemini key, then its Groq key.
pub fn select_provider(
    provider: Option<&str>,
    request_key: Option<&str>,
    defaults: &ProviderDefaults,
) -> Option<ProviderSelection> {
    let request_key = non_empty(request_key);
    let default_gemini = non_empty(defaults.gemini_api_key.as_deref());
    let default_groq = non_empty(defaults.groq_api_key.as_deref());

    let pick = |(env_var, model): (&'static str, &'static str), key: Option<&str>| {
        key.map(|key| ProviderSelection {
            env_var,
            api_key: key.to_string(),
            model,
        })
    };

    let explicit = match provider {
        Some("gemini" | "google") => pick(GEMINI, request_key.or(default_gemini)),
        Some("groq") => pick(GROQ, request_key.or(default_groq)),
        Some("anthropic") => pick(ANTHROPIC, request_key),
        Some("openai") => pick(OPENAI, request_key),
        Some("openrouter") => pick(OPENROUTER, request_key),
        _ => None,
    };
    explicit
        .or_else(|| pick(GEMINI, default_gemini))
        .or_else(|| pick(GROQ, default_groq))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub env: EnvSection,
    pub agents: AgentsSection,
    pub channels: ChannelsSection,
    pub gateway: GatewaySection,
    pub plugins: PluginsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvSection {
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentsSection {
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDefaults {
    pub model: ModelChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelChoice {
    pub primary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelsSection {
    pub telegram: TelegramChannel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannel {
    pub enabled: bool,
    pub bot_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_from: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewaySection {
    pub mode: String,
    pub port: u16,
    pub auth: GatewayAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayAuth {
    pub mode: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginsSection {
    pub entries: BTreeMap<String, PluginEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginEntry {
    pub enabled: bool,
}

impl AppConfig {
    /// Build the config for one tenant.
    ///
    /// A non-empty `owner_ids` restricts direct messages to those users.
    pub fn build(
        bot_token: &str,
        provider: Option<&ProviderSelection>,
        owner_ids: &[String],
        gateway_port: u16,
        access_token: &str,
    ) -> Self {
        let mut vars = BTreeMap::new();
        let mut model = DEFAULT_MODEL.to_string();
        if let Some(selection) = provider {
            vars.insert(selection.env_var.to_string(), selection.api_key.clone());
            model = selection.model.to_string();
        }

        let (allow_from, dm_policy) = if owner_ids.is_empty() {
            (None, None)
        } else {
            (Some(owner_ids.to_vec()), Some("allowlist".to_string()))
        };

        let mut entries = BTreeMap::new();
        entries.insert("telegram".to_string(), PluginEntry { enabled: true });

        Self {
            env: EnvSection { vars },
            agents: AgentsSection {
                defaults: AgentDefaults {
                    model: ModelChoice { primary: model },
                },
            },
            channels: ChannelsSection {
                telegram: TelegramChannel {
                    enabled: true,
                    bot_token: bot_token.to_string(),
                    allow_from,
                    dm_policy,
                },
            },
            gateway: GatewaySection {
                mode: "local".to_string(),
                port: gateway_port,
                auth: GatewayAuth {
                    mode: "token".to_string(),
                    token: access_token.to_string(),
                },
            },
            plugins: PluginsSection { entries },
        }
    }
}
