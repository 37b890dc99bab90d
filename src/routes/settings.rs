use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub google_api_key: Option<String>,
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let settings = state
        .db
        .get_settings(user.id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("User {} updated settings", user.username);

    let settings = state
        .db
        .update_settings(user.id, request.google_api_key.as_deref())
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(settings))
}
