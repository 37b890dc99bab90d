use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::routes::{AppState, Pagination};
use crate::social;

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

/// Verdict of a feed validation pass, with what was learned about the
/// feed when it parsed.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_duplicate: bool,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let sources = state
        .db
        .get_sources_for_user(user.id, pagination.limit, pagination.skip)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(sources))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateSourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if state
        .db
        .source_exists(user.id, &request.url)
        .await
        .map_err(AppError::Internal)?
    {
        return Err(AppError::Conflict(
            "This RSS feed is already in your sources".to_string(),
        ));
    }

    // Creation is gated on the feed actually parsing
    state
        .fetcher
        .validate_feed(&request.url)
        .await
        .map_err(|e| AppError::Validation(format!("Invalid RSS feed: {e}")))?;

    let source = state
        .db
        .create_source(user.id, &request.url, request.name.as_deref())
        .await
        .map_err(AppError::Internal)?;

    info!("User {} added source {}", user.username, source.url);
    Ok((StatusCode::CREATED, Json(source)))
}

/// Checks a feed URL without creating anything.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<UrlRequest>,
) -> Result<impl IntoResponse, AppError> {
    let is_duplicate = state
        .db
        .source_exists(user.id, &request.url)
        .await
        .map_err(AppError::Internal)?;

    let response = match state.fetcher.validate_feed(&request.url).await {
        Ok(info) => ValidateResponse {
            valid: true,
            title: info.title,
            entry_count: Some(info.entry_count),
            error: None,
            is_duplicate,
        },
        Err(e) => ValidateResponse {
            valid: false,
            title: None,
            entry_count: None,
            error: Some(e.to_string()),
            is_duplicate,
        },
    };

    Ok(Json(response))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(source_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let source = state
        .db
        .delete_source(source_id, user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("RSS source not found".to_string()))?;

    info!("User {} deleted source {}", user.username, source.url);
    Ok(Json(source))
}

/// Fetches one source immediately and reports how many articles landed.
pub async fn fetch_one(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(source_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let source = state
        .db
        .get_source(source_id, user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("RSS source not found".to_string()))?;

    let outcome = state.fetcher.refresh_source(&source).await;
    Ok(Json(outcome))
}

/// Refreshes all of the user's active sources. Returns an empty result
/// list when a refresh is already running.
pub async fn refresh_all(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let results = state
        .fetcher
        .refresh_user_sources(user.id)
        .await
        .map_err(AppError::Internal)?;

    let total_inserted: usize = results.iter().map(|r| r.inserted).sum();
    Ok(Json(json!({
        "results": results,
        "total_new_articles": total_inserted,
    })))
}

pub async fn analyze(
    AuthUser(_user): AuthUser,
    Json(request): Json<UrlRequest>,
) -> impl IntoResponse {
    Json(social::analyze_url(social::DEFAULT_RSSHUB_BASE, &request.url))
}

pub async fn platforms(AuthUser(_user): AuthUser) -> impl IntoResponse {
    Json(json!({ "platforms": social::platform_list() }))
}
