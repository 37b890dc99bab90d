pub mod articles;
pub mod auth;
pub mod podcasts;
pub mod settings;
pub mod sources;

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::fetcher::Fetcher;
use crate::generator::Generator;

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
    pub generator: Generator,
    pub config: Config,
}

/// skip/limit pagination used by the listing endpoints.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/me", get(auth::me))
        .route(
            "/api/v1/sources",
            get(sources::list).post(sources::create),
        )
        .route("/api/v1/sources/validate", post(sources::validate))
        .route("/api/v1/sources/refresh", post(sources::refresh_all))
        .route("/api/v1/sources/analyze", post(sources::analyze))
        .route("/api/v1/sources/platforms", get(sources::platforms))
        .route("/api/v1/sources/:id", axum::routing::delete(sources::delete))
        .route("/api/v1/sources/:id/fetch", post(sources::fetch_one))
        .route("/api/v1/articles/today", get(articles::today))
        .route("/api/v1/articles/stats", get(articles::stats))
        .route(
            "/api/v1/articles/select-for-podcast",
            post(articles::select_for_podcast),
        )
        .route("/api/v1/articles/:id/read", put(articles::mark_read))
        .route("/api/v1/articles/:id/unread", put(articles::mark_unread))
        .route("/api/v1/podcasts", get(podcasts::list))
        .route("/api/v1/podcasts/create", post(podcasts::create))
        .route(
            "/api/v1/podcasts/generate-today",
            post(podcasts::generate_today),
        )
        .route("/api/v1/podcasts/task/:task_id", get(podcasts::task_status))
        .route(
            "/api/v1/podcasts/:id",
            get(podcasts::detail).delete(podcasts::delete),
        )
        .route("/api/v1/podcasts/:id/audio", get(podcasts::audio))
        .route(
            "/api/v1/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
