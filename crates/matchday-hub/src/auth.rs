//! Bearer token verification for socket connections.
//!
//! Tokens are issued elsewhere; the hub only verifies them. A token is
//! read from the `Authorization: Bearer <token>` header or, for browser
//! clients that cannot set headers on a socket upgrade, from the `token`
//! query parameter. The header wins when both are present.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use matchday_types::UserId;
use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Claims carried by a hub token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user.
    pub sub: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Turns a raw token into an authenticated principal.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the user it was issued to.
    fn verify(&self, token: &str) -> Result<UserId, HubError>;
}

/// HS256 verifier with a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, HubError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| HubError::Authentication(e.to_string()))?;
        let user = UserId::new(data.claims.sub);
        if user.is_empty() {
            return Err(HubError::Authentication(String::from("token has no subject")));
        }
        Ok(user)
    }
}

/// Find the bearer token in the request headers or query.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, HubError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let raw = value
            .to_str()
            .map_err(|e| HubError::Authentication(format!("invalid authorization header: {e}")))?;
        let token = raw
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HubError::Authentication(String::from("expected a bearer token")))?;
        return Ok(token.to_owned());
    }

    query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| HubError::Authentication(String::from("no token provided")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    const SECRET: &str = "test-secret";

    fn token(sub: &str, exp: u64) -> String {
        let claims = Claims {
            sub: sub.to_owned(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn far_future() -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap() + 3_600
    }

    #[test]
    fn valid_token_yields_subject() {
        let verifier = JwtVerifier::new(SECRET);
        let user = verifier.verify(&token("user-7", far_future())).unwrap();
        assert_eq!(user, UserId::new("user-7"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new("other-secret");
        let err = verifier.verify(&token("user-7", far_future())).unwrap_err();
        assert!(err.to_string().starts_with("Authentication error: "));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(verifier.verify(&token("user-7", 1_000)).is_err());
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers, Some("from-query")).unwrap(), "from-header");
        assert_eq!(extract_token(&HeaderMap::new(), Some("from-query")).unwrap(), "from-query");
        assert!(extract_token(&HeaderMap::new(), None).is_err());
    }

    #[test]
    fn non_bearer_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&headers, None).is_err());
    }
}
