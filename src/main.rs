use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use briefcast::config::Config;
use briefcast::db::Database;
use briefcast::fetcher::{start_background_refresh, Fetcher};
use briefcast::generator::Generator;
use briefcast::jobs::JobTracker;
use briefcast::routes::{self, AppState};
use briefcast::script::ScriptWriter;
use briefcast::tts::TtsEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "briefcast=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("briefcast.toml")?;
    if config.google_api_key.is_none() {
        info!("No server-wide Google API key configured; users must supply their own");
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    // Create fetcher and start the background refresh task
    let fetcher = Arc::new(Fetcher::new(db.clone()));
    let bg_fetcher = fetcher.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_fetcher, refresh_interval).await;
    });

    // Assemble the generation pipeline
    let gemini_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;
    let generator = Generator {
        db: db.clone(),
        jobs: JobTracker::new(),
        script_writer: Arc::new(ScriptWriter::new(
            gemini_client.clone(),
            &config.gemini_base_url,
            &config.text_model,
        )),
        tts: Arc::new(TtsEngine::new(
            gemini_client,
            &config.gemini_base_url,
            &config.tts_model,
            &config.voice_joe,
            &config.voice_jane,
            config.podcast_dir.clone(),
        )),
        server_api_key: config.google_api_key.clone(),
    };

    // Create app state and build the router
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        db,
        fetcher,
        generator,
        config,
    });
    let app = routes::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
