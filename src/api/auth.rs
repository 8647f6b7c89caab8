//! Operator API key check for `/api/*`

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use super::ApiState;
use crate::security::auth::constant_time_eq;

/// Bearer credential from the Authorization header, if present and non-empty
///
/// Also used by the WebSocket handshake, where the header takes precedence
/// over the `token` query parameter.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Reject `/api/*` requests without the configured operator key
///
/// With no key configured every request passes, which is only meant for
/// local development.
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &state.api_key else {
        return Ok(next.run(req).await);
    };

    let presented = bearer_token(req.headers());
    if presented.is_some_and(|key| constant_time_eq(key.as_bytes(), expected.expose_secret().as_bytes())) {
        return Ok(next.run(req).await);
    }

    tracing::warn!(
        path = %req.uri().path(),
        presented = presented.is_some(),
        "rejected operator request"
    );
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_bearer_credential() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&with_auth("Bearer key-123")), Some("key-123"));
        assert_eq!(bearer_token(&with_auth("Bearer  padded ")), Some("padded"));
    }

    #[test]
    fn ignores_other_schemes_and_blanks() {
        assert_eq!(bearer_token(&with_auth("Basic abc")), None);
        assert_eq!(bearer_token(&with_auth("Bearer ")), None);
        assert_eq!(bearer_token(&with_auth("bearer lowercase")), None);
    }
}
