use crate::events::{AudioPayload, TextFragment};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_VOICE_ID: &str = "en-US-natalie";
pub const DEFAULT_FALLBACK_AUDIO_PATH: &str = "static/fallback.mp3";

/// A text-to-speech provider producing one payload per call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioPayload>;
}

/// Batch synthesis with layered fallbacks.
///
/// The whole reply is collected first and spoken in one call. If the primary
/// provider fails, the secondary is tried, then the fallback file, and
/// finally nothing is produced at all.
pub struct VoiceSynthesizer {
    primary: Arc<dyn SpeechSynthesizer>,
    secondary: Option<Arc<dyn SpeechSynthesizer>>,
    fallback_path: Option<PathBuf>,
    voice_id: String,
}

impl VoiceSynthesizer {
    pub fn new(primary: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            primary,
            secondary: None,
            fallback_path: None,
            voice_id: DEFAULT_VOICE_ID.to_string(),
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn SpeechSynthesizer>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_fallback_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn synthesize<S>(&self, fragments: S) -> BoxStream<'static, AudioPayload>
    where
        S: Stream<Item = TextFragment> + Send + 'static,
    {
        let primary = self.primary.clone();
        let secondary = self.secondary.clone();
        let fallback_path = self.fallback_path.clone();
        let voice_id = self.voice_id.clone();

        stream::once(async move {
            let text: String = fragments
                .fold(String::new(), |mut acc, fragment| async move {
                    acc.push_str(fragment.as_str());
                    acc
                })
                .await;
            if text.trim().is_empty() {
                return None;
            }
            tracing::debug!("synthesizing {} characters", text.len());

            match primary.synthesize(&text, &voice_id).await {
                Ok(payload) if !payload.is_empty() => return Some(payload),
                Ok(_) => tracing::warn!("primary synthesis returned no audio"),
                Err(e) => tracing::warn!("primary synthesis failed: {:#}", e),
            }

            if let Some(secondary) = secondary {
                match secondary.synthesize(&text, &voice_id).await {
                    Ok(payload) if !payload.is_empty() => return Some(payload),
                    Ok(_) => tracing::warn!("secondary synthesis returned no audio"),
                    Err(e) => tracing::warn!("secondary synthesis failed: {:#}", e),
                }
            }

            let path = fallback_path?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    tracing::info!("using fallback audio from {}", path.display());
                    Some(AudioPayload::mp3(bytes))
                }
                Err(e) => {
                    tracing::warn!("fallback audio unavailable at {}: {}", path.display(), e);
                    None
                }
            }
        })
        .filter_map(|payload| async move { payload })
        .boxed()
    }
}

/// Offline stand-in that never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSpeech;

impl MockSpeech {
    pub fn render(text: &str) -> Vec<u8> {
        format!("MOCK_AUDIO_FOR_{}", text.replace(' ', "_").to_uppercase()).into_bytes()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioPayload> {
        Ok(AudioPayload::mp3(Self::render(text)))
    }
}

pub const MURF_API_BASE_URL: &str = "https://api.murf.ai";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    format: &'a str,
    rate: i32,
    pitch: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    audio_file: Option<String>,
}

/// Murf's request/response API: one POST returns the location of the
/// rendered file, which is then downloaded.
pub struct MurfRestClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl MurfRestClient {
    pub fn new(api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: MURF_API_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfRestClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioPayload> {
        let body = GenerateRequest {
            text,
            voice_id,
            format: "MP3",
            rate: 0,
            pitch: 0,
        };
        let response = self
            .client
            .post(format!("{}/v1/speech/generate", self.base_url))
            .header("api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach Murf")?
            .error_for_status()
            .context("Murf rejected the synthesis request")?
            .json::<GenerateResponse>()
            .await
            .context("Failed to parse Murf response")?;

        let url = response
            .audio_file
            .ok_or_else(|| anyhow!("Murf response did not include an audio file"))?;
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to download synthesized audio")?
            .error_for_status()
            .context("Synthesized audio download failed")?
            .bytes()
            .await
            .context("Failed to read synthesized audio")?;
        Ok(AudioPayload::mp3(bytes.to_vec()))
    }
}
