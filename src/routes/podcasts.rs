use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::db::{today_start, ArticleSummary, Podcast, User};
use crate::error::AppError;
use crate::jobs::JobState;
use crate::routes::{AppState, Pagination};
use crate::script::ArticleData;

#[derive(Debug, Serialize)]
pub struct PodcastWithArticles {
    #[serde(flatten)]
    pub podcast: Podcast,
    pub articles: Vec<ArticleSummary>,
}

/// Creates a pending podcast from an article id set and kicks off the
/// generation pipeline. Shared by the article-selection and podcast
/// endpoints, which expose the same contract.
pub async fn start_generation(
    state: &AppState,
    user: &User,
    article_ids: Vec<i64>,
    title: Option<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // Selection is a set: drop duplicates, keep first-seen order
    let mut seen = std::collections::HashSet::new();
    let unique_ids: Vec<i64> = article_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();

    let mut articles = Vec::new();
    for article_id in &unique_ids {
        if let Some(article) = state
            .db
            .get_article_for_user(*article_id, user.id)
            .await
            .map_err(AppError::Internal)?
        {
            articles.push(article);
        }
    }

    if articles.is_empty() {
        return Err(AppError::BadRequest(
            "No valid articles selected".to_string(),
        ));
    }

    let title =
        title.unwrap_or_else(|| format!("News Podcast {}", Utc::now().format("%Y-%m-%d")));

    let podcast = state
        .db
        .create_podcast(user.id, &title)
        .await
        .map_err(AppError::Internal)?;

    let linked_ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
    state
        .db
        .link_podcast_articles(podcast.id, &linked_ids)
        .await
        .map_err(AppError::Internal)?;

    let article_data: Vec<ArticleData> = articles
        .into_iter()
        .map(|a| ArticleData {
            id: a.id,
            title: a.title,
            content: a.content,
            author: a.author.unwrap_or_default(),
            article_url: a.article_url,
        })
        .collect();

    let task_id = state
        .generator
        .spawn(podcast.id, user.id, article_data)
        .await;

    info!(
        "User {} queued podcast {} ({} articles, task {task_id})",
        user.username,
        podcast.id,
        linked_ids.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "podcast_id": podcast.id,
            "task_id": task_id,
            "status": podcast.status,
        })),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let podcasts = state
        .db
        .get_podcasts_for_user(user.id, pagination.limit, pagination.skip)
        .await
        .map_err(AppError::Internal)?;

    let mut out = Vec::with_capacity(podcasts.len());
    for podcast in podcasts {
        let articles = state
            .db
            .get_podcast_articles(podcast.id)
            .await
            .map_err(AppError::Internal)?;
        out.push(PodcastWithArticles { podcast, articles });
    }

    Ok(Json(out))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(podcast_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let podcast = state
        .db
        .get_podcast(podcast_id, user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Podcast not found".to_string()))?;

    let articles = state
        .db
        .get_podcast_articles(podcast.id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(PodcastWithArticles { podcast, articles }))
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateRequest {
    pub article_ids: Vec<i64>,
    pub title: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    start_generation(&state, &user, request.article_ids, request.title).await
}

/// Generates a podcast from everything fetched today.
pub async fn generate_today(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let articles = state
        .db
        .get_articles_fetched_since(user.id, &today_start())
        .await
        .map_err(AppError::Internal)?;

    if articles.is_empty() {
        return Err(AppError::NotFound(
            "No articles found for today".to_string(),
        ));
    }

    let article_ids = articles.iter().map(|a| a.id).collect();
    start_generation(&state, &user, article_ids, None).await
}

/// Task status polling. An unknown task id reads as pending, matching
/// the task-queue semantics the client was written against.
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job = state
        .generator
        .jobs
        .get(&task_id)
        .await
        .unwrap_or(JobState::Pending);

    let mut body = json!({
        "task_id": task_id,
        "state": job.name(),
    });

    match job {
        JobState::Pending => {}
        JobState::Progress {
            current,
            total,
            status,
        } => {
            body["current"] = json!(current);
            body["total"] = json!(total);
            body["status"] = json!(status);
        }
        JobState::Success { result } => {
            body["result"] = result;
        }
        JobState::Failure { error } => {
            body["error"] = json!(error);
        }
    }

    Ok(Json(body))
}

/// Deletes the podcast row and its audio artifact.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(podcast_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let podcast = state
        .db
        .delete_podcast(podcast_id, user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Podcast not found".to_string()))?;

    if !podcast.audio_file_path.is_empty() {
        if let Err(e) = tokio::fs::remove_file(&podcast.audio_file_path).await {
            warn!(
                "Failed to remove audio file {}: {e}",
                podcast.audio_file_path
            );
        }
    }

    info!("User {} deleted podcast {}", user.username, podcast.id);
    Ok(Json(podcast))
}

/// Authenticated byte stream of the finished WAV.
pub async fn audio(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(podcast_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let podcast = state
        .db
        .get_podcast(podcast_id, user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Podcast not found".to_string()))?;

    if podcast.audio_file_path.is_empty() {
        return Err(AppError::NotFound(
            "Audio not yet available for this podcast".to_string(),
        ));
    }

    let bytes = match tokio::fs::read(&podcast.audio_file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Audio file not found".to_string()));
        }
        Err(e) => return Err(AppError::Internal(e.into())),
    };

    let filename = std::path::Path::new(&podcast.audio_file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("podcast.wav")
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}
