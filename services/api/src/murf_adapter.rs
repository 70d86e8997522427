use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use meraki_core::AudioPayload;
use meraki_core::synth::SpeechSynthesizer;
use murf_realtime::types::VoiceConfig;
use secrecy::SecretString;
use std::time::Duration;

const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Murf's streaming WebSocket, one connection per reply.
pub struct MurfStreamingSynth {
    api_key: SecretString,
    url: String,
}

impl MurfStreamingSynth {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            url: murf_realtime::STREAM_URL.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfStreamingSynth {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioPayload> {
        let voice = VoiceConfig::new(voice_id);
        let audio = tokio::time::timeout(SYNTHESIS_TIMEOUT, async {
            let mut client = murf_realtime::connect(&self.url, &self.api_key).await?;
            client.synthesize(text, &voice).await
        })
        .await
        .context("Murf streaming synthesis timed out")??;

        if audio.is_empty() {
            bail!("Murf returned no audio");
        }
        tracing::info!("Murf streamed {} bytes of audio", audio.len());
        Ok(AudioPayload::mp3(audio))
    }
}
