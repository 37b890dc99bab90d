use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::User;
use crate::error::AppError;
use crate::routes::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User email
    pub sub: String,
    /// Expiry as a unix timestamp
    pub exp: usize,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn create_access_token(
    email: &str,
    secret: &str,
    expiry_minutes: i64,
) -> anyhow::Result<String> {
    let expire = Utc::now() + chrono::Duration::minutes(expiry_minutes);
    let claims = Claims {
        sub: email.to_string(),
        exp: expire.timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Extractor resolving the bearer token to the authenticated user. Any
/// failure along the way is the same 401 so the response does not reveal
/// whether a token was malformed, expired, or referenced a deleted user.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(AppError::unauthorized)?;

        let claims =
            decode_token(token, &state.config.jwt_secret).ok_or_else(AppError::unauthorized)?;

        let user = state
            .db
            .get_user_by_email(&claims.sub)
            .await
            .map_err(AppError::Internal)?
            .ok_or_else(AppError::unauthorized)?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn test_verify_with_garbage_hash() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_token_roundtrip() {
        let token = create_access_token("a@example.com", SECRET, 30).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "a@example.com");
    }

    #[test]
    fn test_expired_token_rejected() {
        // Well past the default validation leeway
        let token = create_access_token("a@example.com", SECRET, -5).unwrap();
        assert!(decode_token(&token, SECRET).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_access_token("a@example.com", SECRET, 30).unwrap();
        assert!(decode_token(&token, "other-secret").is_none());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(decode_token("definitely.not.a-jwt", SECRET).is_none());
    }
}
