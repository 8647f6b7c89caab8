//! Connection handshake authentication
//!
//! Two credential kinds are accepted:
//! - HS256 JWTs signed with the configured secret (`sub` is the subject,
//!   an optional `role` claim pins the token to one endpoint)
//! - Static tokens from configuration, each mapped to a subject
//!
//! With neither configured every handshake is refused.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::connections::{ConnectionRole, Identity};

/// Handshake authentication failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    Missing,

    #[error("invalid credential: {0}")]
    Invalid(String),

    #[error("credential is for {actual}, not {expected}")]
    RoleMismatch {
        expected: ConnectionRole,
        actual: ConnectionRole,
    },

    #[error("no credentials configured")]
    NotConfigured,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// JWT claims carried by handshake tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ConnectionRole>,
}

struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Verifies bearer credentials and maps them to an [`Identity`]
pub struct Authenticator {
    jwt: Option<JwtKeys>,
    /// token -> subject
    tokens: HashMap<String, String>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("jwt", &self.jwt.is_some())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl Authenticator {
    /// Build from an optional signing secret and static token map
    #[must_use]
    pub fn new(jwt_secret: Option<&SecretString>, tokens: HashMap<String, String>) -> Self {
        let jwt = jwt_secret
            .map(|secret| secret.expose_secret())
            .filter(|secret| !secret.is_empty())
            .map(|secret| JwtKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            });

        Self { jwt, tokens }
    }

    /// Whether any credential kind is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.jwt.is_some() || !self.tokens.is_empty()
    }

    /// Whether tokens can be issued
    #[must_use]
    pub const fn can_issue(&self) -> bool {
        self.jwt.is_some()
    }

    /// Verify a credential presented on the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the credential is missing, unknown, expired, or
    /// pinned to the other role
    pub fn authenticate(&self, token: &str, role: ConnectionRole) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        if let Some(subject) = self.lookup_static(token) {
            return Ok(Identity::new(subject, role));
        }

        let Some(keys) = &self.jwt else {
            return Err(AuthError::Invalid("unknown token".to_string()));
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?
            .claims;

        if let Some(actual) = claims.role
            && actual != role
        {
            return Err(AuthError::RoleMismatch {
                expected: role,
                actual,
            });
        }
        if claims.sub.is_empty() {
            return Err(AuthError::Invalid("empty subject".to_string()));
        }

        Ok(Identity::new(claims.sub, role))
    }

    /// Sign a handshake token for `subject`
    ///
    /// # Errors
    ///
    /// Returns error if no secret is configured or signing fails
    pub fn issue(
        &self,
        subject: &str,
        role: Option<ConnectionRole>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let keys = self.jwt.as_ref().ok_or(AuthError::NotConfigured)?;

        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let claims = Claims {
            sub: subject.to_string(),
            exp: now.saturating_add(ttl.as_secs()),
            role,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn lookup_static(&self, provided: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(token, _)| constant_time_eq(token.as_bytes(), provided.as_bytes()))
            .map(|(_, subject)| subject.as_str())
    }
}

/// Constant-time byte comparison
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
