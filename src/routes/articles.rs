use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::db::{today_start, ArticleWithSource};
use crate::error::AppError;
use crate::routes::{podcasts, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct TodayQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub source_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub article_ids: Vec<i64>,
    pub title: Option<String>,
}

/// Applies the read-state, source, and search filters to the day's
/// articles. Filters combine as a logical AND; the search term matches
/// case-insensitively against title, summary, and source name.
pub fn filter_articles(articles: Vec<ArticleWithSource>, query: &TodayQuery) -> Vec<ArticleWithSource> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase);

    articles
        .into_iter()
        .filter(|article| !query.unread_only || !article.is_read)
        .filter(|article| query.source_id.map_or(true, |id| article.source_id == id))
        .filter(|article| {
            let Some(term) = &search else {
                return true;
            };
            let source_name = article
                .source_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(&article.source_url);
            article.title.to_lowercase().contains(term)
                || article.summary.to_lowercase().contains(term)
                || source_name.to_lowercase().contains(term)
        })
        .collect()
}

pub async fn today(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<TodayQuery>,
) -> Result<impl IntoResponse, AppError> {
    let articles = state
        .db
        .get_articles_fetched_since(user.id, &today_start())
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(filter_articles(articles, &query)))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(article_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_read_state(&state, user.id, article_id, true).await
}

pub async fn mark_unread(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(article_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_read_state(&state, user.id, article_id, false).await
}

async fn set_read_state(
    state: &AppState,
    user_id: i64,
    article_id: i64,
    read: bool,
) -> Result<Json<crate::db::Article>, AppError> {
    state
        .db
        .get_article_for_user(article_id, user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Article not found".to_string()))?;

    state
        .db
        .set_article_read(article_id, read)
        .await
        .map_err(AppError::Internal)?;

    let article = state
        .db
        .get_article_for_user(article_id, user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Article not found".to_string()))?;

    Ok(Json(article))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let total = state
        .db
        .count_articles_for_user(user.id)
        .await
        .map_err(AppError::Internal)?;
    let today = state
        .db
        .count_articles_since(user.id, &today_start())
        .await
        .map_err(AppError::Internal)?;
    let by_source = state
        .db
        .article_counts_by_source(user.id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(json!({
        "total_articles": total,
        "today_articles": today,
        "by_source": by_source,
    })))
}

/// Submits the selected article id set for podcast generation.
pub async fn select_for_podcast(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<SelectRequest>,
) -> Result<impl IntoResponse, AppError> {
    podcasts::start_generation(&state, &user, request.article_ids, request.title).await
}
