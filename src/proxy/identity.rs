//! Caller identity and the authenticator that produces it
//!
//! The forwarder never looks at caller tokens itself. An `Authenticator`
//! turns request headers into a `CallerIdentity`, which is then passed
//! explicitly through the pipeline.

use std::collections::HashMap;
use std::fmt;

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::ClientsConfig;

use super::helpers::{extract_caller_token, fingerprint};

/// Who is calling and what to inject upstream on their behalf
///
/// Built once per request and never shared between requests.
#[derive(Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Config key of the client (`[clients.<id>]`)
    pub client_id: String,
    /// Credential sent upstream as `Authorization: Bearer <secret>`
    pub credential_secret: String,
    /// Provider name used for base URL resolution
    pub provider: String,
    /// Fixed upstream path, appended verbatim
    pub path_override: Option<String>,
}

// Keep the credential out of Debug output, which ends up in logs
impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerIdentity")
            .field("client_id", &self.client_id)
            .field("credential_secret", &"<redacted>")
            .field("provider", &self.provider)
            .field("path_override", &self.path_override)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing client token")]
    MissingToken,

    /// Carries a fingerprint of the presented token, never the token itself
    #[error("unknown client token ({0})")]
    UnknownToken(String),
}

/// Resolves the caller of a request
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` means no authentication source is configured at all
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<CallerIdentity>, AuthError>;
}

/// Authenticator backed by the `[clients.X]` config sections
///
/// Upstream credentials are resolved once at construction, so `api_key_env`
/// is read at startup.
pub struct ClientAuthenticator {
    by_token: HashMap<String, CallerIdentity>,
}

impl ClientAuthenticator {
    pub fn from_config(clients: &ClientsConfig) -> Self {
        let by_token = clients
            .clients
            .iter()
            .filter(|(_, client)| !client.token.is_empty())
            .map(|(id, client)| {
                let identity = CallerIdentity {
                    client_id: id.clone(),
                    credential_secret: client.resolve_api_key().unwrap_or_default(),
                    provider: client.provider.clone(),
                    path_override: client.path_override.clone(),
                };
                (client.token.clone(), identity)
            })
            .collect();

        Self { by_token }
    }

    pub fn is_configured(&self) -> bool {
        !self.by_token.is_empty()
    }
}

impl Authenticator for ClientAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<CallerIdentity>, AuthError> {
        if !self.is_configured() {
            return Ok(None);
        }

        let token = extract_caller_token(headers).ok_or(AuthError::MissingToken)?;
        match self.by_token.get(&token) {
            Some(identity) => {
                tracing::debug!(
                    client = %identity.client_id,
                    token = %fingerprint(&token),
                    "Caller authenticated"
                );
                Ok(Some(identity.clone()))
            }
            None => Err(AuthError::UnknownToken(fingerprint(&token))),
        }
    }
}
