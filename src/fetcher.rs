use std::sync::Arc;
use std::time::Duration;

use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::{Database, NewArticle, Source};

/// How many characters of cleaned article text we keep.
const MAX_CONTENT_CHARS: usize = 1000;
/// Short-form summary length.
const MAX_SUMMARY_CHARS: usize = 200;
/// Concurrent feed fetches during a multi-source refresh.
const REFRESH_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("not a valid feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// What a successful validation learned about a feed.
#[derive(Debug, Clone)]
pub struct FeedInfo {
    pub title: Option<String>,
    pub entry_count: usize,
}

/// Per-source result of a refresh pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FetchOutcome {
    pub source_id: i64,
    pub source: String,
    pub inserted: usize,
    pub error: Option<String>,
}

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("Briefcast/0.1 (RSS Podcast Generator)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            db,
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Fetches and parses a feed without touching the database. Used both
    /// for the standalone validate endpoint and as the gate before source
    /// creation.
    pub async fn validate_feed(&self, url: &str) -> Result<FeedInfo, FeedError> {
        let parsed = url::Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(FeedError::UnsupportedScheme(other.to_string())),
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        Ok(FeedInfo {
            title: feed.title.map(|t| t.content),
            entry_count: feed.entries.len(),
        })
    }

    /// Fetches one source and stores its new articles. Returns the number
    /// of articles actually inserted.
    pub async fn fetch_source(&self, source: &Source) -> Result<usize, FeedError> {
        info!("Fetching source: {} ({})", source.display_title(), source.url);

        let response = self.client.get(&source.url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        if let Some(title) = feed.title.as_ref().map(|t| t.content.trim()) {
            if !title.is_empty() {
                if let Err(e) = self.db.set_source_name_if_missing(source.id, title).await {
                    error!("Failed to backfill source title: {e:#}");
                }
            }
        }

        let mut inserted = 0;
        for entry in feed.entries {
            let Some(article) = Self::map_entry(entry) else {
                continue;
            };
            match self.db.insert_article(source.id, &article).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to store article '{}': {e:#}", article.title),
            }
        }

        info!(
            "Stored {} new articles for source '{}'",
            inserted,
            source.display_title()
        );
        Ok(inserted)
    }

    /// Fetches one source, recording the outcome on the source row.
    pub async fn refresh_source(&self, source: &Source) -> FetchOutcome {
        let result = self.fetch_source(source).await;
        let (inserted, error) = match result {
            Ok(count) => (count, None),
            Err(e) => {
                warn!("Failed to refresh source '{}': {e}", source.url);
                (0, Some(e.to_string()))
            }
        };

        if let Err(e) = self
            .db
            .update_source_fetched(source.id, error.as_deref())
            .await
        {
            error!("Failed to record fetch state for source {}: {e:#}", source.id);
        }

        FetchOutcome {
            source_id: source.id,
            source: source.display_title().to_string(),
            inserted,
            error,
        }
    }

    /// Refreshes all of one user's active sources with bounded concurrency.
    /// Overlapping refresh requests are collapsed: while one is running,
    /// later calls return an empty outcome list immediately.
    pub async fn refresh_user_sources(&self, user_id: i64) -> anyhow::Result<Vec<FetchOutcome>> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(Vec::new());
            }
            *refreshing = true;
        }

        let result = self.do_refresh(self.db.get_active_sources_for_user(user_id).await?).await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        Ok(result)
    }

    /// Refreshes every active source of every user; used by the periodic
    /// background task.
    pub async fn refresh_all_sources(&self) -> anyhow::Result<()> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let sources = self.db.get_all_active_sources().await;
        let result = match sources {
            Ok(sources) => {
                info!("Refreshing {} sources", sources.len());
                self.do_refresh(sources).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh(&self, sources: Vec<Source>) -> Vec<FetchOutcome> {
        stream::iter(sources)
            .map(|source| async move { self.refresh_source(&source).await })
            .buffer_unordered(REFRESH_CONCURRENCY)
            .collect()
            .await
    }

    /// Converts a feed entry into an article. Entries without a link are
    /// dropped; everything else gets best-effort fallbacks.
    pub fn map_entry(entry: feed_rs::model::Entry) -> Option<NewArticle> {
        let article_url = entry.links.first().map(|l| l.href.clone())?;
        if article_url.is_empty() {
            return None;
        }

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());

        // Prefer full content, fall back to the summary element
        let raw = entry
            .content
            .and_then(|c| c.body)
            .or(entry.summary.map(|s| s.content))
            .unwrap_or_default();
        let content = clean_content(&raw);
        let summary = summarize(&content);

        let author = entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .filter(|name| !name.is_empty());

        let published_at = entry.published.or(entry.updated);

        Some(NewArticle {
            title,
            content,
            summary,
            author,
            article_url,
            published_at,
        })
    }
}

/// Strips markup from feed content and caps its length.
pub fn clean_content(html: &str) -> String {
    if html.trim().is_empty() {
        return "No content available.".to_string();
    }

    let text = html2text::from_read(html.as_bytes(), 80)
        .unwrap_or_else(|_| html.to_string());

    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return "No content available.".to_string();
    }

    truncate_chars(&cleaned, MAX_CONTENT_CHARS)
}

/// Short preview derived from the cleaned content.
pub fn summarize(text: &str) -> String {
    truncate_chars(text, MAX_SUMMARY_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("Starting initial feed refresh");
    if let Err(e) = fetcher.refresh_all_sources().await {
        error!("Initial feed refresh failed: {e:#}");
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = fetcher.refresh_all_sources().await {
            error!("Scheduled feed refresh failed: {e:#}");
        }
    }
}
