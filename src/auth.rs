#![allow(dead_code)]

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Resolves the authenticated user id from the request headers.
///
/// Order: dev `x-user-id` override (non-production only, behind config),
/// then `Authorization: Bearer <jwt>` verified with the shared HS256 secret.
pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    require_user(state, headers).await.map(|user| user.id)
}

pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(AuthUser {
                id: user_id,
                email: None,
                full_name: None,
            });
        }
    }

    let token = bearer_token(headers).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: missing bearer token.".to_string())
    })?;

    let secret = state.config.auth_jwt_secret.as_deref().ok_or_else(|| {
        AppError::Dependency("Auth is not configured. Set AUTH_JWT_SECRET.".to_string())
    })?;

    let claims = decode_claims(&token, secret)?;
    if claims.sub.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "Unauthorized: token has no subject.".to_string(),
        ));
    }

    Ok(AuthUser {
        id: claims.sub,
        email: claims.email,
        full_name: claims.full_name,
    })
}

fn decode_claims(token: &str, secret: &str) -> Result<AuthClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<AuthClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|error| AppError::Unauthorized(format!("Unauthorized: invalid token ({error}).")))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_value(headers, "authorization")?;
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{bearer_token, decode_claims};
    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def".to_string()));

        let mut empty = HeaderMap::new();
        empty.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&empty), None);
    }

    #[test]
    fn round_trips_claims() {
        let claims = super::AuthClaims {
            sub: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            email: Some("manager@example.com".to_string()),
            full_name: None,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let claims_json = serde_json::json!({
            "sub": claims.sub,
            "email": claims.email,
            "exp": claims.exp,
        });
        let token = encode(
            &Header::default(),
            &claims_json,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let decoded = decode_claims(&token, "test-secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.email.as_deref(), Some("manager@example.com"));

        assert!(decode_claims(&token, "wrong-secret").is_err());
    }
}
