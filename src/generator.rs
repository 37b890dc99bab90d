use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::db::{podcast_status, Database};
use crate::jobs::JobTracker;
use crate::script::{ArticleData, ScriptWriter};
use crate::tts::TtsEngine;

/// The podcast generation pipeline: script -> audio -> database update.
/// Cheap to clone so each request can carry its own handle into a spawned
/// task.
#[derive(Clone)]
pub struct Generator {
    pub db: Arc<Database>,
    pub jobs: JobTracker,
    pub script_writer: Arc<ScriptWriter>,
    pub tts: Arc<TtsEngine>,
    /// Server-wide API key; per-user settings take precedence.
    pub server_api_key: Option<String>,
}

impl Generator {
    /// Registers a task and runs the pipeline in the background. Returns
    /// the task id for status polling.
    pub async fn spawn(
        &self,
        podcast_id: i64,
        user_id: i64,
        articles: Vec<ArticleData>,
    ) -> String {
        let task_id = self.jobs.create().await;
        let generator = self.clone();
        let task = task_id.clone();
        tokio::spawn(async move {
            generator.run(&task, podcast_id, user_id, articles).await;
        });
        task_id
    }

    pub async fn run(
        &self,
        task_id: &str,
        podcast_id: i64,
        user_id: i64,
        articles: Vec<ArticleData>,
    ) {
        if let Err(e) = self.run_pipeline(task_id, podcast_id, user_id, &articles).await {
            error!("Podcast {podcast_id} generation failed: {e:#}");
            self.jobs.fail(task_id, &e.to_string()).await;
            if let Err(db_err) = self
                .db
                .set_podcast_status(podcast_id, podcast_status::FAILED)
                .await
            {
                error!("Failed to mark podcast {podcast_id} failed: {db_err:#}");
            }
        }
    }

    async fn run_pipeline(
        &self,
        task_id: &str,
        podcast_id: i64,
        user_id: i64,
        articles: &[ArticleData],
    ) -> anyhow::Result<()> {
        info!(
            "Starting podcast generation: podcast {podcast_id}, {} articles",
            articles.len()
        );

        let api_key = self
            .resolve_api_key(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no Google API key configured"))?;

        self.db
            .set_podcast_status(podcast_id, podcast_status::PROCESSING)
            .await?;
        self.jobs
            .set_progress(task_id, 10, "Generating script...")
            .await;

        let script = self.script_writer.generate(&api_key, articles).await?;

        self.jobs
            .set_progress(task_id, 40, "Script generated, creating audio...")
            .await;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("podcast_{podcast_id}_{user_id}_{timestamp}.wav");

        // A script with no audio is still a usable podcast; audio failures
        // degrade rather than fail the task.
        let audio_path = match self.tts.synthesize(&api_key, &script, &filename).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Audio generation for podcast {podcast_id} failed: {e:#}");
                None
            }
        };

        self.jobs
            .set_progress(task_id, 90, "Updating database...")
            .await;

        let audio_str = audio_path.as_ref().and_then(|p| p.to_str());
        self.db
            .store_podcast_result(podcast_id, &script, audio_str, podcast_status::COMPLETED)
            .await?;

        let has_audio = audio_path.is_some();
        self.jobs
            .succeed(
                task_id,
                json!({
                    "podcast_id": podcast_id,
                    "audio_path": audio_str,
                    "script_length": script.len(),
                    "status": if has_audio { "completed" } else { "script_only" },
                    "has_audio": has_audio,
                }),
            )
            .await;

        info!("Podcast {podcast_id} generation completed (audio: {has_audio})");
        Ok(())
    }

    async fn resolve_api_key(&self, user_id: i64) -> anyhow::Result<Option<String>> {
        let settings = self.db.get_settings(user_id).await?;
        let user_key = settings
            .google_api_key
            .filter(|key| !key.trim().is_empty());
        Ok(user_key.or_else(|| self.server_api_key.clone()))
    }
}
