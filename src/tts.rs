use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

/// PCM format returned by the speech model.
pub const SAMPLE_RATE: u32 = 24_000;
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Scripts estimated above this are truncated before synthesis.
const MAX_SCRIPT_TOKENS: usize = 30_000;
const TRUNCATED_SCRIPT_CHARS: usize = 28_000 * 4;
/// Scripts estimated at or below this are tried in one request first.
const DIRECT_SYNTHESIS_TOKENS: usize = 5_000;
/// Character budget per chunk in chunked synthesis.
const CHUNK_SIZE: usize = 400;
const MAX_ATTEMPTS: u32 = 3;

/// Synthesizes multi-speaker podcast audio through the generative language
/// API and assembles the returned PCM into WAV files.
pub struct TtsEngine {
    client: Client,
    base_url: String,
    model: String,
    voice_joe: String,
    voice_jane: String,
    output_dir: PathBuf,
}

impl TtsEngine {
    pub fn new(
        client: Client,
        base_url: &str,
        model: &str,
        voice_joe: &str,
        voice_jane: &str,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            voice_joe: voice_joe.to_string(),
            voice_jane: voice_jane.to_string(),
            output_dir,
        }
    }

    /// Turns a script into a WAV file under the output directory and
    /// returns its path. Large scripts are synthesized in chunks and the
    /// chunks concatenated.
    pub async fn synthesize(
        &self,
        api_key: &str,
        script: &str,
        filename: &str,
    ) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .context("failed to create podcast output directory")?;

        let script = truncate_script(script);
        let estimated = estimate_tokens(&script);
        info!("Synthesizing script: {} chars (~{estimated} tokens)", script.len());

        let output_path = self.output_dir.join(ensure_wav_extension(filename));

        if estimated <= DIRECT_SYNTHESIS_TOKENS {
            match self.synthesize_with_retry(api_key, &script, &output_path).await {
                Ok(()) => return Ok(output_path),
                Err(e) if is_size_related(&e) => {
                    warn!("Direct synthesis failed ({e:#}), falling back to chunks");
                }
                Err(e) => return Err(e),
            }
        }

        self.synthesize_chunked(api_key, &script, &output_path).await?;
        Ok(output_path)
    }

    async fn synthesize_chunked(
        &self,
        api_key: &str,
        script: &str,
        output_path: &Path,
    ) -> anyhow::Result<()> {
        let chunks = split_script(script, CHUNK_SIZE);
        info!("Synthesizing {} chunks", chunks.len());

        let filename = output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("podcast.wav");

        let mut chunk_paths = Vec::new();
        let result = async {
            for (i, chunk) in chunks.iter().enumerate() {
                let chunk_path = self.output_dir.join(format!("chunk_{i}_{filename}"));
                self.synthesize_with_retry(api_key, chunk, &chunk_path)
                    .await
                    .with_context(|| format!("chunk {} of {}", i + 1, chunks.len()))?;
                chunk_paths.push(chunk_path);

                // Pace requests between chunks
                if i + 1 < chunks.len() {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
            combine_wav_files(&chunk_paths, output_path)
        }
        .await;

        for chunk_path in &chunk_paths {
            if let Err(e) = std::fs::remove_file(chunk_path) {
                warn!("Failed to remove chunk file {}: {e}", chunk_path.display());
            }
        }

        result
    }

    async fn synthesize_with_retry(
        &self,
        api_key: &str,
        text: &str,
        output_path: &Path,
    ) -> anyhow::Result<()> {
        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.synthesize_once(api_key, text).await {
                Ok(pcm) => {
                    write_wav(&pcm, output_path)?;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Synthesis attempt {} failed: {e:#}", attempt + 1);
                    last_error = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
        }
        Err(last_error.expect("at least one attempt ran"))
    }

    async fn synthesize_once(&self, api_key: &str, text: &str) -> anyhow::Result<Vec<u8>> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "multiSpeakerVoiceConfig": {
                        "speakerVoiceConfigs": [
                            {
                                "speaker": "Joe",
                                "voiceConfig": {
                                    "prebuiltVoiceConfig": { "voiceName": self.voice_joe }
                                }
                            },
                            {
                                "speaker": "Jane",
                                "voiceConfig": {
                                    "prebuiltVoiceConfig": { "voiceName": self.voice_jane }
                                }
                            }
                        ]
                    }
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("speech synthesis returned HTTP {status}: {detail}");
        }

        let payload: Value = response
            .json()
            .await
            .context("speech response was not valid JSON")?;

        extract_audio(&payload).context("speech response contained no audio data")
    }
}

/// Pulls the inline base64 PCM payload out of a generateContent response.
pub fn extract_audio(payload: &Value) -> anyhow::Result<Vec<u8>> {
    let data = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("inlineData"))
        .and_then(|d| d.get("data"))
        .and_then(|d| d.as_str())
        .context("missing inline audio data")?;

    base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("audio payload was not valid base64")
}

/// Splits a script into chunks on line boundaries so speaker turns stay
/// intact. A single oversized line still becomes its own chunk.
pub fn split_script(script: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if current_size + line.len() > max_chunk_size && !current.is_empty() {
            chunks.push(current.join("\n"));
            current = vec![line];
            current_size = line.len();
        } else {
            current.push(line);
            current_size += line.len();
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}

/// Caps scripts that would blow the model context.
pub fn truncate_script(script: &str) -> String {
    if estimate_tokens(script) <= MAX_SCRIPT_TOKENS {
        return script.to_string();
    }
    warn!(
        "Script of ~{} tokens exceeds the synthesis limit, truncating",
        estimate_tokens(script)
    );
    script.chars().take(TRUNCATED_SCRIPT_CHARS).collect()
}

fn is_size_related(error: &anyhow::Error) -> bool {
    let message = format!("{error:#}").to_lowercase();
    ["context", "token", "length", "timeout", "disconnected"]
        .iter()
        .any(|keyword| message.contains(keyword))
}

fn ensure_wav_extension(filename: &str) -> String {
    if filename.ends_with(".wav") {
        filename.to_string()
    } else {
        match filename.rsplit_once('.') {
            Some((stem, _)) => format!("{stem}.wav"),
            None => format!("{filename}.wav"),
        }
    }
}

fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Wraps raw little-endian 16-bit PCM into a WAV container.
pub fn write_wav(pcm: &[u8], output_path: &Path) -> anyhow::Result<()> {
    let mut writer = hound::WavWriter::create(output_path, wav_spec())
        .with_context(|| format!("failed to create {}", output_path.display()))?;

    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }

    writer.finalize()?;
    Ok(())
}

/// Concatenates WAV files sample-wise into one output file.
pub fn combine_wav_files(inputs: &[PathBuf], output_path: &Path) -> anyhow::Result<()> {
    let mut writer = hound::WavWriter::create(output_path, wav_spec())
        .with_context(|| format!("failed to create {}", output_path.display()))?;

    for input in inputs {
        let mut reader = hound::WavReader::open(input)
            .with_context(|| format!("failed to open {}", input.display()))?;
        for sample in reader.samples::<i16>() {
            writer.write_sample(sample?)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
