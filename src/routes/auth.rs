use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{create_access_token, hash_password, verify_password, AuthUser};
use crate::error::AppError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Form-encoded credential pair. The `username` field carries the email
/// address, matching the OAuth2 password-flow shape the API exposes.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if state
        .db
        .get_user_by_email(&request.email)
        .await
        .map_err(AppError::Internal)?
        .is_some()
    {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }
    if state
        .db
        .get_user_by_username(&request.username)
        .await
        .map_err(AppError::Internal)?
        .is_some()
    {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    let password_hash = hash_password(&request.password).map_err(AppError::Internal)?;
    let user = state
        .db
        .create_user(&request.email, &request.username, &password_hash)
        .await
        .map_err(AppError::Internal)?;

    info!("Registered user {}", user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .get_user_by_email(&form.username)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::Unauthorized("Incorrect email or password".to_string()))?;

    if !verify_password(&form.password, &user.password_hash) {
        return Err(AppError::Unauthorized(
            "Incorrect email or password".to_string(),
        ));
    }

    let token = create_access_token(
        &user.email,
        &state.config.jwt_secret,
        state.config.token_expiry_minutes,
    )
    .map_err(AppError::Internal)?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

pub async fn me(AuthUser(user): AuthUser) -> impl IntoResponse {
    Json(user)
}
