use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::IntentCreationError;

/// Gateway client secrets embed the intent id: `<intent id>_secret_<nonce>`.
const SECRET_DELIMITER: &str = "_secret_";

/// Identifier of one funds-authorization attempt at the gateway (e.g. `pi_123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationId(String);

impl AuthorizationId {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use secret handed to the gateway's confirmation call.
///
/// Only obtainable through [`AuthorizationHandle`], so the embedded intent id is always present.
#[derive(PartialEq, Eq)]
pub struct ClientSecret {
    secret: String,
    authorization_id: AuthorizationId,
}

impl ClientSecret {
    pub fn expose(&self) -> &str {
        &self.secret
    }

    pub fn authorization_id(&self) -> &AuthorizationId {
        &self.authorization_id
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("authorization_id", &self.authorization_id)
            .field("secret", &"**redacted**")
            .finish()
    }
}

/// Authorization handle issued by the backend for one checkout attempt.
///
/// Not `Clone`: submitting moves it into the gateway call.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthorizationHandle {
    client_secret: ClientSecret,
}

impl AuthorizationHandle {
    pub fn from_client_secret(secret: impl Into<String>) -> Result<Self, IntentCreationError> {
        let secret = secret.into();
        let intent_id = secret
            .split_once(SECRET_DELIMITER)
            .map(|(id, nonce)| (id.trim(), nonce))
            .filter(|(id, nonce)| !id.is_empty() && !nonce.is_empty())
            .and_then(|(id, _)| AuthorizationId::parse(id))
            .ok_or_else(|| {
                IntentCreationError::MalformedHandle(
                    "client secret does not embed an authorization id".to_string(),
                )
            })?;

        Ok(Self {
            client_secret: ClientSecret {
                secret,
                authorization_id: intent_id,
            },
        })
    }

    pub fn authorization_id(&self) -> &AuthorizationId {
        self.client_secret.authorization_id()
    }

    pub fn client_secret(&self) -> &ClientSecret {
        &self.client_secret
    }
}
