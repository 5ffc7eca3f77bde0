//! Request body processing hook
//!
//! Runs after the body is read and before the upstream request is built.
//! Processors are trusted infrastructure: a failure here is a server error.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use crate::config::ClientsConfig;

use super::identity::CallerIdentity;

#[derive(Debug, Error)]
pub enum BodyProcessingError {
    #[error("request body is not a JSON object: {0}")]
    NotJsonObject(String),

    #[error("failed to re-encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Rewrites request bodies per caller
pub trait BodyProcessor: Send + Sync {
    fn process(&self, identity: &CallerIdentity, body: Bytes)
        -> Result<Bytes, BodyProcessingError>;
}

/// Passes bodies through untouched
pub struct Passthrough;

impl BodyProcessor for Passthrough {
    fn process(
        &self,
        _identity: &CallerIdentity,
        body: Bytes,
    ) -> Result<Bytes, BodyProcessingError> {
        Ok(body)
    }
}

/// Applies `[clients.<id>.body_overrides]` to JSON request bodies
///
/// Overrides replace top-level fields, e.g. forcing `model` for a client.
pub struct ClientBodyProcessor {
    overrides: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl ClientBodyProcessor {
    pub fn from_config(clients: &ClientsConfig) -> Self {
        let overrides = clients
            .clients
            .iter()
            .filter(|(_, client)| !client.body_overrides.is_empty())
            .map(|(id, client)| {
                let fields = client
                    .body_overrides
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (id.clone(), fields)
            })
            .collect();

        Self { overrides }
    }

    /// True when no client has overrides configured
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl BodyProcessor for ClientBodyProcessor {
    fn process(
        &self,
        identity: &CallerIdentity,
        body: Bytes,
    ) -> Result<Bytes, BodyProcessingError> {
        let Some(fields) = self.overrides.get(&identity.client_id) else {
            return Ok(body);
        };
        if body.is_empty() {
            return Ok(body);
        }

        let mut value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| BodyProcessingError::NotJsonObject(e.to_string()))?;
        let object = value.as_object_mut().ok_or_else(|| {
            BodyProcessingError::NotJsonObject("top-level value is not an object".to_string())
        })?;

        for (field, replacement) in fields {
            object.insert(field.clone(), replacement.clone());
        }

        tracing::debug!(
            client = %identity.client_id,
            fields = fields.len(),
            "Applied body overrides"
        );

        Ok(Bytes::from(serde_json::to_vec(&value)?))
    }
}
