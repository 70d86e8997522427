//! Pipeline tunables and the credential set a session needs before it starts.

use crate::error::ConfigError;
use crate::history::MAX_HISTORY_TURNS;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

pub const SPEECH_KEY_NAME: &str = "ASSEMBLYAI_API_KEY";
pub const GENERATION_KEY_NAME: &str = "GEMINI_API_KEY";
pub const SYNTHESIS_KEY_NAME: &str = "MURF_API_KEY";
pub const FEED_KEY_NAME: &str = "NEWS_API_KEY";

/// Sample rate the recognizer is fed with (16 kHz mono PCM16).
pub const SAMPLE_RATE_HZ: u32 = 16_000;
/// 100 ms of 16 kHz mono PCM16 silence.
pub const SILENCE_FRAME_BYTES: usize = 3_200;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub history_cap: usize,
    pub audio_queue_capacity: usize,
    pub poll_timeout: Duration,
    pub silence_frame_bytes: usize,
    pub recognition_channel_capacity: usize,
    pub worker_join_timeout: Duration,
    pub sample_rate: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_cap: MAX_HISTORY_TURNS,
            audio_queue_capacity: 100,
            poll_timeout: Duration::from_millis(100),
            silence_frame_bytes: SILENCE_FRAME_BYTES,
            recognition_channel_capacity: 128,
            worker_join_timeout: Duration::from_secs(2),
            sample_rate: SAMPLE_RATE_HZ,
        }
    }
}

/// Provider keys. Any of them may be absent at process start; absence is
/// only an error once a session tries to begin.
#[derive(Debug, Default)]
pub struct Credentials {
    pub speech: Option<SecretString>,
    pub generation: Option<SecretString>,
    pub synthesis: Option<SecretString>,
    pub feed: Option<SecretString>,
    /// Whether the configured synthesis provider needs a key at all.
    pub synthesis_required: bool,
}

/// Presence of each key, for status reporting. Never carries the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CredentialStatus {
    pub speech: bool,
    pub generation: bool,
    pub synthesis: bool,
    pub feed: bool,
}

fn present(key: &Option<SecretString>) -> bool {
    key.as_ref()
        .is_some_and(|k| !k.expose_secret().trim().is_empty())
}

impl Credentials {
    /// Checks every required key and names all of the missing ones at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if !present(&self.speech) {
            missing.push(SPEECH_KEY_NAME);
        }
        if !present(&self.generation) {
            missing.push(GENERATION_KEY_NAME);
        }
        if self.synthesis_required && !present(&self.synthesis) {
            missing.push(SYNTHESIS_KEY_NAME);
        }
        if !present(&self.feed) {
            missing.push(FEED_KEY_NAME);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }

    pub fn status(&self) -> CredentialStatus {
        CredentialStatus {
            speech: present(&self.speech),
            generation: present(&self.generation),
            synthesis: present(&self.synthesis),
            feed: present(&self.feed),
        }
    }
}
