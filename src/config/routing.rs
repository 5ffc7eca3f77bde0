//! Client and provider routing configuration
//!
//! Clients are the callers of the relay. Each one presents its own token and
//! is bound to a provider plus the credential the relay injects upstream.

use serde::Deserialize;
use std::collections::HashMap;

/// Provider used when a name is neither configured nor built in
pub const FALLBACK_PROVIDER: &str = "openai";

/// Base URLs for providers that work without a `[providers.X]` section
const BUILTIN_PROVIDERS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("anthropic", "https://api.anthropic.com/v1"),
    ("deepseek", "https://api.deepseek.com/v1"),
    (
        "gemini",
        "https://generativelanguage.googleapis.com/v1beta/openai",
    ),
    ("openrouter", "https://openrouter.ai/api/v1"),
];

/// Built-in base URL for a provider name, if one exists
fn builtin_base_url(provider: &str) -> Option<&'static str> {
    BUILTIN_PROVIDERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(provider))
        .map(|(_, url)| *url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Provider backend configuration
///
/// Defines where to forward API requests for a given provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the provider's API, including any version segment
    /// (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Optional display name
    pub name: Option<String>,
}

impl ProviderConfig {
    /// Get display name (falls back to base_url)
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.base_url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A caller allowed to use the relay
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Token the caller presents (`Authorization: Bearer` or `x-api-key`)
    pub token: String,

    /// Human-readable name for logs
    pub name: Option<String>,

    /// Provider backend to route requests to (references [providers.X] or a built-in)
    pub provider: String,

    /// Upstream credential value (direct, less secure - prefer api_key_env)
    pub api_key: Option<String>,

    /// Environment variable name to read the upstream credential from (preferred)
    pub api_key_env: Option<String>,

    /// Fixed upstream path used instead of the inbound one
    ///
    /// Appended to the provider base URL exactly as written; the inbound
    /// path normalization (`/` and `v1/` stripping) does not apply to it.
    pub path_override: Option<String>,

    /// Top-level JSON fields forced onto every request body from this client
    #[serde(default)]
    pub body_overrides: HashMap<String, serde_json::Value>,
}

impl ClientConfig {
    /// Resolve the upstream credential
    /// Priority: env var > direct value
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(env_name) = &self.api_key_env {
            if let Ok(value) = std::env::var(env_name) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }

        self.api_key.clone().filter(|key| !key.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clients Container
// ─────────────────────────────────────────────────────────────────────────────

/// Container for all client and provider configurations
#[derive(Debug, Clone, Default)]
pub struct ClientsConfig {
    /// Map of client_id -> ClientConfig
    pub clients: HashMap<String, ClientConfig>,

    /// Map of provider_id -> ProviderConfig
    pub providers: HashMap<String, ProviderConfig>,
}

impl ClientsConfig {
    /// Check if clients are configured (not empty)
    pub fn is_configured(&self) -> bool {
        !self.clients.is_empty()
    }

    /// Check whether a provider name resolves without falling back
    pub fn knows_provider(&self, provider: &str) -> bool {
        self.providers.contains_key(provider) || builtin_base_url(provider).is_some()
    }

    /// Base URL for a provider, without a trailing slash
    ///
    /// Resolution order:
    /// 1. `[providers.X]` from config
    /// 2. Built-in provider table
    /// 3. The fallback provider's built-in URL
    pub fn base_url_for(&self, provider: &str) -> String {
        let url = self
            .providers
            .get(provider)
            .map(|p| p.base_url.as_str())
            .or_else(|| builtin_base_url(provider))
            .or_else(|| builtin_base_url(FALLBACK_PROVIDER))
            .unwrap_or_default();
        url.strip_suffix('/').unwrap_or(url).to_string()
    }

    /// Semantic checks that don't prevent startup
    ///
    /// Returns one message per problem, sorted for stable output.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut seen_tokens: HashMap<&str, &str> = HashMap::new();

        for (id, client) in &self.clients {
            if !self.knows_provider(&client.provider) {
                warnings.push(format!(
                    "client '{}' references unknown provider '{}' (falling back to '{}')",
                    id, client.provider, FALLBACK_PROVIDER
                ));
            }
            if client.resolve_api_key().is_none() {
                warnings.push(format!("client '{}' has no upstream api key", id));
            }
            if client.token.is_empty() {
                warnings.push(format!("client '{}' has an empty token", id));
            } else if let Some(other) = seen_tokens.insert(client.token.as_str(), id.as_str()) {
                let (first, second) = if other < id.as_str() {
                    (other, id.as_str())
                } else {
                    (id.as_str(), other)
                };
                warnings.push(format!(
                    "clients '{}' and '{}' share the same token",
                    first, second
                ));
            }
        }

        warnings.sort();
        warnings
    }
}
