use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};

/// The slice of an article that feeds the scriptwriter prompt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArticleData {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub article_url: String,
}

/// Generates two-speaker podcast scripts from article batches via the
/// generative language API.
pub struct ScriptWriter {
    client: Client,
    base_url: String,
    model: String,
}

impl ScriptWriter {
    pub fn new(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn generate(&self, api_key: &str, articles: &[ArticleData]) -> anyhow::Result<String> {
        let prompt = build_prompt(articles);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("script generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("script generation returned HTTP {status}: {detail}");
        }

        let payload: Value = response
            .json()
            .await
            .context("script generation returned invalid JSON")?;

        let script = extract_text(&payload)
            .context("script generation response contained no text")?
            .trim()
            .to_string();

        if script.is_empty() {
            anyhow::bail!("script generation produced an empty script");
        }

        tracing::info!("Generated script: {} characters", script.len());
        Ok(script)
    }
}

/// Pulls the generated text out of a generateContent response.
pub fn extract_text(payload: &Value) -> Option<&str> {
    payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

pub fn build_prompt(articles: &[ArticleData]) -> String {
    let mut article_content = String::new();
    for (i, article) in articles.iter().enumerate() {
        let n = i + 1;
        article_content.push_str(&format!("Article {n} Title: {}\n", article.title));
        article_content.push_str(&format!("Article {n} Content: {}\n\n", article.content));
    }

    format!(
        r#"You are an expert podcast scriptwriter. Your task is to transform the following articles into a natural and engaging two-person dialogue script between a host, "Joe", and an expert guest, "Jane".

- The script must be a concise summary of the articles' key points.
- Start with a brief introduction from Joe.
- The entire output must be only the script itself, following this format exactly:
  Joe: [Joe's dialogue]
  Jane: [Jane's dialogue]

Here are the articles to transform:
---
{article_content}---
Script:
"#
    )
}
