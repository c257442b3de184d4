use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, placed in request extensions by [`require_auth`].
pub struct JwtUser(pub Uuid);

impl<S> FromRequestParts<S> for JwtUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Uuid>()
            .copied()
            .map(JwtUser)
            .ok_or(ApiError::Unauthorized("missing user"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue_token(secret: &str, user_id: Uuid, ttl: Duration) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("jwt encode error: {}", e)))
}

/// Verifies signature and expiry, then reads the subject as a user id.
pub fn verify_token(secret: &str, token: &str) -> Result<Uuid, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "jwt decode error");
        ApiError::Unauthorized("invalid token")
    })?;

    Uuid::parse_str(&token_data.claims.sub).map_err(|_| ApiError::Unauthorized("invalid subject"))
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized("missing token"))?;
    let user_id = verify_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issued_token_round_trips_to_user_id() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, Duration::hours(1)).unwrap();

        assert_eq!(verify_token(SECRET, &token).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), Duration::hours(1)).unwrap();

        assert!(matches!(
            verify_token("other-secret", &token),
            Err(ApiError::Unauthorized("invalid token"))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), Duration::hours(-2)).unwrap();

        assert!(matches!(
            verify_token(SECRET, &token),
            Err(ApiError::Unauthorized("invalid token"))
        ));
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "testuser".to_string(),
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            verify_token(SECRET, &token),
            Err(ApiError::Unauthorized("invalid subject"))
        ));
    }
}
