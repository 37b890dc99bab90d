use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Server configuration, loaded from a TOML file with environment
/// overrides. Every field has a default so the server can boot without a
/// config file at all (useful for tests and first runs).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    pub database_url: String,
    /// HS256 signing secret for access tokens
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    pub token_expiry_minutes: i64,
    /// Server-wide Google API key; per-user settings take precedence
    pub google_api_key: Option<String>,
    pub text_model: String,
    pub tts_model: String,
    /// Base URL of the generative language API (swapped out in tests)
    pub gemini_base_url: String,
    /// Directory where finished podcast audio lands
    pub podcast_dir: PathBuf,
    /// Background feed refresh interval in minutes
    pub refresh_interval: u64,
    pub voice_joe: String,
    pub voice_jane: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:briefcast.db?mode=rwc".to_string(),
            jwt_secret: "insecure-dev-secret".to_string(),
            token_expiry_minutes: 30,
            google_api_key: None,
            text_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            podcast_dir: PathBuf::from("podcasts"),
            refresh_interval: 15,
            voice_joe: "aoede".to_string(),
            voice_jane: "charon".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = if path.as_ref().exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BRIEFCAST_DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(addr) = std::env::var("BRIEFCAST_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(secret) = std::env::var("BRIEFCAST_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.google_api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.token_expiry_minutes, 30);
        assert_eq!(config.text_model, "gemini-2.5-flash");
        assert_eq!(config.voice_joe, "aoede");
        assert_eq!(config.voice_jane, "charon");
        assert!(config.google_api_key.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            bind_addr = "127.0.0.1:9000"
            database_url = "sqlite::memory:"
            jwt_secret = "test-secret"
            refresh_interval = 30
            google_api_key = "test-key"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.refresh_interval, 30);
        // Unspecified fields keep their defaults
        assert_eq!(config.text_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/path/briefcast.toml").unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_from_str_partial_config() {
        let config = Config::from_str("refresh_interval = 5").unwrap();
        assert_eq!(config.refresh_interval, 5);
        assert_eq!(config.tts_model, "gemini-2.5-flash-preview-tts");
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = Config::from_str("this is not valid toml {{{");
        assert!(result.is_err());
    }

    #[test]
    fn test_voices_configurable() {
        let content = r#"
            voice_joe = "puck"
            voice_jane = "kore"
        "#;
        let config = Config::from_str(content).unwrap();
        assert_eq!(config.voice_joe, "puck");
        assert_eq!(config.voice_jane, "kore");
    }
}
