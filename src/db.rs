use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

/// Podcast lifecycle states as stored in the `status` column.
pub mod podcast_status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub google_api_key: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Source {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub last_fetched: Option<String>,
    pub last_error: Option<String>,
}

impl Source {
    /// Display title: custom/detected name when present, raw URL otherwise.
    pub fn display_title(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.url,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: Option<String>,
    pub article_url: String,
    pub published_at: Option<String>,
    pub fetched_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
}

/// Article joined with its source, as served by the today listing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ArticleWithSource {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: Option<String>,
    pub article_url: String,
    pub published_at: Option<String>,
    pub fetched_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub source_name: Option<String>,
    pub source_url: String,
}

/// Fields of an article as produced by a feed fetch, before insertion.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: Option<String>,
    pub article_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Podcast {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub script: String,
    pub audio_file_path: String,
    pub status: String,
    pub created_at: String,
}

/// Trimmed article view linked from a podcast.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Start of the current UTC day as an RFC 3339 string. All stored
/// timestamps share the same +00:00 offset, so string comparison orders
/// them correctly.
pub fn today_start() -> String {
    Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
        .to_rfc3339()
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_settings (
                user_id INTEGER PRIMARY KEY REFERENCES users(id),
                google_api_key TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rss_sources (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                url TEXT NOT NULL,
                name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_fetched TEXT,
                last_error TEXT,
                UNIQUE(user_id, url)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES rss_sources(id),
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                author TEXT,
                article_url TEXT NOT NULL UNIQUE,
                published_at TEXT,
                fetched_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_source_fetched
            ON articles(source_id, fetched_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS podcasts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                script TEXT NOT NULL DEFAULT '',
                audio_file_path TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS podcast_articles (
                podcast_id INTEGER NOT NULL REFERENCES podcasts(id),
                article_id INTEGER NOT NULL REFERENCES articles(id),
                PRIMARY KEY (podcast_id, article_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, username, password_hash, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_user_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {id} missing after insert"))
    }

    pub async fn get_user_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // ---- settings ----

    pub async fn get_settings(&self, user_id: i64) -> anyhow::Result<UserSettings> {
        let settings =
            sqlx::query_as::<_, UserSettings>("SELECT * FROM user_settings WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(settings.unwrap_or(UserSettings {
            user_id,
            google_api_key: None,
            updated_at: now_rfc3339(),
        }))
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        google_api_key: Option<&str>,
    ) -> anyhow::Result<UserSettings> {
        let now = now_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, google_api_key, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                google_api_key = excluded.google_api_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(google_api_key)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_settings(user_id).await
    }

    // ---- rss sources ----

    pub async fn create_source(
        &self,
        user_id: i64,
        url: &str,
        name: Option<&str>,
    ) -> anyhow::Result<Source> {
        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO rss_sources (user_id, url, name, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_source(id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("source {id} missing after insert"))
    }

    pub async fn source_exists(&self, user_id: i64, url: &str) -> anyhow::Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rss_sources WHERE user_id = ? AND url = ?")
                .bind(user_id)
                .bind(url)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    pub async fn get_source(&self, source_id: i64, user_id: i64) -> anyhow::Result<Option<Source>> {
        let source =
            sqlx::query_as::<_, Source>("SELECT * FROM rss_sources WHERE id = ? AND user_id = ?")
                .bind(source_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(source)
    }

    pub async fn get_sources_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT * FROM rss_sources WHERE user_id = ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    pub async fn get_active_sources_for_user(&self, user_id: i64) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT * FROM rss_sources WHERE user_id = ? AND is_active = 1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Active sources across all users, for the background refresh loop.
    pub async fn get_all_active_sources(&self) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT * FROM rss_sources WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Deletes a source and everything hanging off it. Returns the deleted
    /// row, or None when the source does not exist or belongs to another
    /// user.
    pub async fn delete_source(
        &self,
        source_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<Source>> {
        let Some(source) = self.get_source(source_id, user_id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            DELETE FROM podcast_articles
            WHERE article_id IN (SELECT id FROM articles WHERE source_id = ?)
            "#,
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM articles WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM rss_sources WHERE id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(source))
    }

    /// Backfills the detected feed title, but never overwrites a custom name.
    pub async fn set_source_name_if_missing(
        &self,
        source_id: i64,
        name: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE rss_sources SET name = ? WHERE id = ? AND (name IS NULL OR name = '')",
        )
        .bind(name)
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_source_fetched(
        &self,
        source_id: i64,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        let now = now_rfc3339();
        sqlx::query("UPDATE rss_sources SET last_fetched = ?, last_error = ? WHERE id = ?")
            .bind(&now)
            .bind(error)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- articles ----

    /// Inserts a fetched article. Articles are keyed by their URL; an
    /// already-known URL is left untouched. Returns whether a row was
    /// actually inserted.
    pub async fn insert_article(
        &self,
        source_id: i64,
        article: &NewArticle,
    ) -> anyhow::Result<bool> {
        let published = article.published_at.map(|p| p.to_rfc3339());
        let now = now_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (source_id, title, content, summary, author, article_url, published_at, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_url) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(&article.article_url)
        .bind(published)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_articles_fetched_since(
        &self,
        user_id: i64,
        since: &str,
    ) -> anyhow::Result<Vec<ArticleWithSource>> {
        let articles = sqlx::query_as::<_, ArticleWithSource>(
            r#"
            SELECT a.id, a.source_id, a.title, a.content, a.summary, a.author,
                   a.article_url, a.published_at, a.fetched_at, a.is_read, a.read_at,
                   s.name AS source_name, s.url AS source_url
            FROM articles a
            JOIN rss_sources s ON s.id = a.source_id
            WHERE s.user_id = ? AND a.fetched_at >= ?
            ORDER BY a.published_at DESC NULLS LAST, a.id DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Looks up an article, scoped to sources owned by the given user.
    pub async fn get_article_for_user(
        &self,
        article_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            SELECT a.* FROM articles a
            JOIN rss_sources s ON s.id = a.source_id
            WHERE a.id = ? AND s.user_id = ?
            "#,
        )
        .bind(article_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn set_article_read(&self, article_id: i64, read: bool) -> anyhow::Result<()> {
        let read_at = read.then(now_rfc3339);
        sqlx::query("UPDATE articles SET is_read = ?, read_at = ? WHERE id = ?")
            .bind(read)
            .bind(read_at)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_articles_for_user(&self, user_id: i64) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM articles a
            JOIN rss_sources s ON s.id = a.source_id
            WHERE s.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn count_articles_since(&self, user_id: i64, since: &str) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM articles a
            JOIN rss_sources s ON s.id = a.source_id
            WHERE s.user_id = ? AND a.fetched_at >= ?
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn article_counts_by_source(&self, user_id: i64) -> anyhow::Result<Vec<SourceCount>> {
        let counts = sqlx::query_as::<_, SourceCount>(
            r#"
            SELECT COALESCE(NULLIF(s.name, ''), s.url) AS source,
                   COUNT(a.id) AS count
            FROM rss_sources s
            JOIN articles a ON a.source_id = s.id
            WHERE s.user_id = ?
            GROUP BY s.id
            ORDER BY count DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    // ---- podcasts ----

    pub async fn create_podcast(&self, user_id: i64, title: &str) -> anyhow::Result<Podcast> {
        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO podcasts (user_id, title, status, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(podcast_status::PENDING)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_podcast(id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("podcast {id} missing after insert"))
    }

    pub async fn link_podcast_articles(
        &self,
        podcast_id: i64,
        article_ids: &[i64],
    ) -> anyhow::Result<()> {
        for article_id in article_ids {
            sqlx::query(
                r#"
                INSERT INTO podcast_articles (podcast_id, article_id)
                VALUES (?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(podcast_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_podcast(
        &self,
        podcast_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<Podcast>> {
        let podcast =
            sqlx::query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = ? AND user_id = ?")
                .bind(podcast_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(podcast)
    }

    /// Unscoped lookup, for the generation pipeline which already knows the
    /// owner.
    pub async fn get_podcast_by_id(&self, podcast_id: i64) -> anyhow::Result<Option<Podcast>> {
        let podcast = sqlx::query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = ?")
            .bind(podcast_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(podcast)
    }

    pub async fn get_podcasts_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Podcast>> {
        let podcasts = sqlx::query_as::<_, Podcast>(
            r#"
            SELECT * FROM podcasts
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(podcasts)
    }

    pub async fn get_podcast_articles(
        &self,
        podcast_id: i64,
    ) -> anyhow::Result<Vec<ArticleSummary>> {
        let articles = sqlx::query_as::<_, ArticleSummary>(
            r#"
            SELECT a.id, a.title, a.author, a.published_at
            FROM articles a
            JOIN podcast_articles pa ON pa.article_id = a.id
            WHERE pa.podcast_id = ?
            ORDER BY a.id
            "#,
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn set_podcast_status(&self, podcast_id: i64, status: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE podcasts SET status = ? WHERE id = ?")
            .bind(status)
            .bind(podcast_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stores pipeline output. The audio path is only written when the
    /// pipeline actually produced a file.
    pub async fn store_podcast_result(
        &self,
        podcast_id: i64,
        script: &str,
        audio_path: Option<&str>,
        status: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE podcasts
            SET script = ?, audio_file_path = COALESCE(?, audio_file_path), status = ?
            WHERE id = ?
            "#,
        )
        .bind(script)
        .bind(audio_path)
        .bind(status)
        .bind(podcast_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_podcast(
        &self,
        podcast_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<Podcast>> {
        let Some(podcast) = self.get_podcast(podcast_id, user_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM podcast_articles WHERE podcast_id = ?")
            .bind(podcast_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM podcasts WHERE id = ?")
            .bind(podcast_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(podcast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    async fn create_test_user(db: &Database, email: &str, username: &str) -> User {
        db.create_user(email, username, "hash").await.unwrap()
    }

    fn new_article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            content: format!("{title} content"),
            summary: format!("{title} summary"),
            author: Some("Reporter".to_string()),
            article_url: url.to_string(),
            published_at: Some(Utc::now()),
        }
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            let result = db.initialize().await;
            assert!(result.is_ok());
        }
    }

    mod user_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_and_fetch_user() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            assert_eq!(user.email, "a@example.com");
            assert_eq!(user.username, "alice");
            assert!(!user.created_at.is_empty());

            let by_email = db.get_user_by_email("a@example.com").await.unwrap();
            assert_eq!(by_email.unwrap().id, user.id);

            let by_name = db.get_user_by_username("alice").await.unwrap();
            assert_eq!(by_name.unwrap().id, user.id);
        }

        #[tokio::test]
        async fn test_duplicate_email_rejected() {
            let db = create_test_db().await;
            create_test_user(&db, "a@example.com", "alice").await;

            let result = db.create_user("a@example.com", "alice2", "hash").await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_unknown_user_is_none() {
            let db = create_test_db().await;
            assert!(db.get_user_by_email("nobody@example.com").await.unwrap().is_none());
        }
    }

    mod settings_tests {
        use super::*;

        #[tokio::test]
        async fn test_settings_default_when_unset() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            let settings = db.get_settings(user.id).await.unwrap();
            assert_eq!(settings.user_id, user.id);
            assert!(settings.google_api_key.is_none());
        }

        #[tokio::test]
        async fn test_settings_upsert_roundtrip() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            db.update_settings(user.id, Some("key-1")).await.unwrap();
            let settings = db.get_settings(user.id).await.unwrap();
            assert_eq!(settings.google_api_key.as_deref(), Some("key-1"));

            db.update_settings(user.id, Some("key-2")).await.unwrap();
            let settings = db.get_settings(user.id).await.unwrap();
            assert_eq!(settings.google_api_key.as_deref(), Some("key-2"));

            db.update_settings(user.id, None).await.unwrap();
            let settings = db.get_settings(user.id).await.unwrap();
            assert!(settings.google_api_key.is_none());
        }
    }

    mod source_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_and_list_sources() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            db.create_source(user.id, "https://a.com/rss", Some("A"))
                .await
                .unwrap();
            db.create_source(user.id, "https://b.com/rss", None)
                .await
                .unwrap();

            let sources = db.get_sources_for_user(user.id, 100, 0).await.unwrap();
            assert_eq!(sources.len(), 2);
            assert_eq!(sources[0].display_title(), "A");
            assert_eq!(sources[1].display_title(), "https://b.com/rss");
            assert!(sources[0].is_active);
        }

        #[tokio::test]
        async fn test_sources_scoped_to_user() {
            let db = create_test_db().await;
            let alice = create_test_user(&db, "a@example.com", "alice").await;
            let bob = create_test_user(&db, "b@example.com", "bob").await;

            let source = db
                .create_source(alice.id, "https://a.com/rss", None)
                .await
                .unwrap();

            assert!(db.get_source(source.id, bob.id).await.unwrap().is_none());
            assert!(db.get_source(source.id, alice.id).await.unwrap().is_some());
            assert!(db.delete_source(source.id, bob.id).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_duplicate_url_per_user() {
            let db = create_test_db().await;
            let alice = create_test_user(&db, "a@example.com", "alice").await;
            let bob = create_test_user(&db, "b@example.com", "bob").await;

            db.create_source(alice.id, "https://a.com/rss", None)
                .await
                .unwrap();
            assert!(db.source_exists(alice.id, "https://a.com/rss").await.unwrap());
            assert!(!db.source_exists(bob.id, "https://a.com/rss").await.unwrap());

            // Same URL is fine for a different user
            assert!(db.create_source(bob.id, "https://a.com/rss", None).await.is_ok());
            // ...but a constraint violation for the same user
            assert!(db.create_source(alice.id, "https://a.com/rss", None).await.is_err());
        }

        #[tokio::test]
        async fn test_name_backfill_preserves_custom_name() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            let unnamed = db
                .create_source(user.id, "https://a.com/rss", None)
                .await
                .unwrap();
            let named = db
                .create_source(user.id, "https://b.com/rss", Some("My Feed"))
                .await
                .unwrap();

            db.set_source_name_if_missing(unnamed.id, "Detected Title")
                .await
                .unwrap();
            db.set_source_name_if_missing(named.id, "Detected Title")
                .await
                .unwrap();

            let unnamed = db.get_source(unnamed.id, user.id).await.unwrap().unwrap();
            let named = db.get_source(named.id, user.id).await.unwrap().unwrap();
            assert_eq!(unnamed.name.as_deref(), Some("Detected Title"));
            assert_eq!(named.name.as_deref(), Some("My Feed"));
        }

        #[tokio::test]
        async fn test_update_source_fetched() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let source = db
                .create_source(user.id, "https://a.com/rss", None)
                .await
                .unwrap();
            assert!(source.last_fetched.is_none());

            db.update_source_fetched(source.id, Some("timeout"))
                .await
                .unwrap();
            let source = db.get_source(source.id, user.id).await.unwrap().unwrap();
            assert!(source.last_fetched.is_some());
            assert_eq!(source.last_error.as_deref(), Some("timeout"));

            db.update_source_fetched(source.id, None).await.unwrap();
            let source = db.get_source(source.id, user.id).await.unwrap().unwrap();
            assert!(source.last_error.is_none());
        }

        #[tokio::test]
        async fn test_delete_source_cascades_articles() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let source = db
                .create_source(user.id, "https://a.com/rss", None)
                .await
                .unwrap();

            db.insert_article(source.id, &new_article("https://a.com/1", "One"))
                .await
                .unwrap();
            assert_eq!(db.count_articles_for_user(user.id).await.unwrap(), 1);

            let deleted = db.delete_source(source.id, user.id).await.unwrap();
            assert!(deleted.is_some());
            assert_eq!(db.count_articles_for_user(user.id).await.unwrap(), 0);
        }
    }

    mod article_tests {
        use super::*;

        #[tokio::test]
        async fn test_insert_article_dedupes_on_url() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let source = db
                .create_source(user.id, "https://a.com/rss", None)
                .await
                .unwrap();

            let inserted = db
                .insert_article(source.id, &new_article("https://a.com/1", "One"))
                .await
                .unwrap();
            assert!(inserted);

            let inserted_again = db
                .insert_article(source.id, &new_article("https://a.com/1", "One again"))
                .await
                .unwrap();
            assert!(!inserted_again);

            assert_eq!(db.count_articles_for_user(user.id).await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_fetched_since_filters_and_joins_source() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let source = db
                .create_source(user.id, "https://a.com/rss", Some("A Feed"))
                .await
                .unwrap();

            db.insert_article(source.id, &new_article("https://a.com/1", "One"))
                .await
                .unwrap();

            let since_past = "2000-01-01T00:00:00+00:00";
            let articles = db
                .get_articles_fetched_since(user.id, since_past)
                .await
                .unwrap();
            assert_eq!(articles.len(), 1);
            assert_eq!(articles[0].source_name.as_deref(), Some("A Feed"));
            assert_eq!(articles[0].source_url, "https://a.com/rss");
            assert!(!articles[0].is_read);

            let since_future = "2999-01-01T00:00:00+00:00";
            let articles = db
                .get_articles_fetched_since(user.id, since_future)
                .await
                .unwrap();
            assert!(articles.is_empty());
        }

        #[tokio::test]
        async fn test_read_toggle() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let source = db
                .create_source(user.id, "https://a.com/rss", None)
                .await
                .unwrap();
            db.insert_article(source.id, &new_article("https://a.com/1", "One"))
                .await
                .unwrap();
            let article = db
                .get_articles_fetched_since(user.id, "2000-01-01T00:00:00+00:00")
                .await
                .unwrap()
                .remove(0);

            db.set_article_read(article.id, true).await.unwrap();
            let read = db
                .get_article_for_user(article.id, user.id)
                .await
                .unwrap()
                .unwrap();
            assert!(read.is_read);
            assert!(read.read_at.is_some());

            db.set_article_read(article.id, false).await.unwrap();
            let unread = db
                .get_article_for_user(article.id, user.id)
                .await
                .unwrap()
                .unwrap();
            assert!(!unread.is_read);
            assert!(unread.read_at.is_none());
        }

        #[tokio::test]
        async fn test_article_ownership_scoping() {
            let db = create_test_db().await;
            let alice = create_test_user(&db, "a@example.com", "alice").await;
            let bob = create_test_user(&db, "b@example.com", "bob").await;
            let source = db
                .create_source(alice.id, "https://a.com/rss", None)
                .await
                .unwrap();
            db.insert_article(source.id, &new_article("https://a.com/1", "One"))
                .await
                .unwrap();
            let article = db
                .get_articles_fetched_since(alice.id, "2000-01-01T00:00:00+00:00")
                .await
                .unwrap()
                .remove(0);

            assert!(db
                .get_article_for_user(article.id, bob.id)
                .await
                .unwrap()
                .is_none());
        }

        #[tokio::test]
        async fn test_stats_counts() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let a = db
                .create_source(user.id, "https://a.com/rss", Some("A"))
                .await
                .unwrap();
            let b = db
                .create_source(user.id, "https://b.com/rss", None)
                .await
                .unwrap();

            for i in 0..3 {
                db.insert_article(a.id, &new_article(&format!("https://a.com/{i}"), "x"))
                    .await
                    .unwrap();
            }
            db.insert_article(b.id, &new_article("https://b.com/0", "y"))
                .await
                .unwrap();

            assert_eq!(db.count_articles_for_user(user.id).await.unwrap(), 4);
            assert_eq!(
                db.count_articles_since(user.id, &today_start()).await.unwrap(),
                4
            );

            let counts = db.article_counts_by_source(user.id).await.unwrap();
            assert_eq!(counts.len(), 2);
            assert_eq!(counts[0].source, "A");
            assert_eq!(counts[0].count, 3);
            // Unnamed source falls back to its URL
            assert_eq!(counts[1].source, "https://b.com/rss");
        }
    }

    mod podcast_tests {
        use super::*;

        async fn seed_articles(db: &Database, user_id: i64, n: usize) -> Vec<i64> {
            let source = db
                .create_source(user_id, "https://a.com/rss", None)
                .await
                .unwrap();
            let mut ids = Vec::new();
            for i in 0..n {
                db.insert_article(source.id, &new_article(&format!("https://a.com/{i}"), "t"))
                    .await
                    .unwrap();
            }
            for article in db
                .get_articles_fetched_since(user_id, "2000-01-01T00:00:00+00:00")
                .await
                .unwrap()
            {
                ids.push(article.id);
            }
            ids
        }

        #[tokio::test]
        async fn test_create_and_link() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let article_ids = seed_articles(&db, user.id, 2).await;

            let podcast = db.create_podcast(user.id, "Daily Briefing").await.unwrap();
            assert_eq!(podcast.status, podcast_status::PENDING);
            assert!(podcast.audio_file_path.is_empty());

            db.link_podcast_articles(podcast.id, &article_ids)
                .await
                .unwrap();
            // Linking is a set: relinking the same ids is a no-op
            db.link_podcast_articles(podcast.id, &article_ids)
                .await
                .unwrap();

            let linked = db.get_podcast_articles(podcast.id).await.unwrap();
            assert_eq!(linked.len(), 2);
        }

        #[tokio::test]
        async fn test_list_newest_first() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;

            db.create_podcast(user.id, "First").await.unwrap();
            db.create_podcast(user.id, "Second").await.unwrap();

            let podcasts = db.get_podcasts_for_user(user.id, 100, 0).await.unwrap();
            assert_eq!(podcasts.len(), 2);
            assert_eq!(podcasts[0].title, "Second");
        }

        #[tokio::test]
        async fn test_store_result_with_and_without_audio() {
            let db = create_test_db().await;
            let user = create_test_user(&db, "a@example.com", "alice").await;
            let podcast = db.create_podcast(user.id, "P").await.unwrap();

            db.store_podcast_result(
                podcast.id,
                "Joe: hello",
                None,
                podcast_status::COMPLETED,
            )
            .await
            .unwrap();
            let p = db.get_podcast(podcast.id, user.id).await.unwrap().unwrap();
            assert_eq!(p.script, "Joe: hello");
            assert!(p.audio_file_path.is_empty());
            assert_eq!(p.status, podcast_status::COMPLETED);

            db.store_podcast_result(
                podcast.id,
                "Joe: hello",
                Some("podcasts/p1.wav"),
                podcast_status::COMPLETED,
            )
            .await
            .unwrap();
            let p = db.get_podcast(podcast.id, user.id).await.unwrap().unwrap();
            assert_eq!(p.audio_file_path, "podcasts/p1.wav");
        }

        #[tokio::test]
        async fn test_delete_podcast_and_scoping() {
            let db = create_test_db().await;
            let alice = create_test_user(&db, "a@example.com", "alice").await;
            let bob = create_test_user(&db, "b@example.com", "bob").await;
            let article_ids = seed_articles(&db, alice.id, 1).await;

            let podcast = db.create_podcast(alice.id, "P").await.unwrap();
            db.link_podcast_articles(podcast.id, &article_ids)
                .await
                .unwrap();

            assert!(db.delete_podcast(podcast.id, bob.id).await.unwrap().is_none());
            let deleted = db.delete_podcast(podcast.id, alice.id).await.unwrap();
            assert!(deleted.is_some());
            assert!(db.get_podcast(podcast.id, alice.id).await.unwrap().is_none());
            assert!(db.get_podcast_articles(podcast.id).await.unwrap().is_empty());
        }
    }
}
