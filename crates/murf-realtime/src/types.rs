use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub voice_id: String,
    pub style: String,
    pub rate: i32,
    pub pitch: i32,
    pub variation: i32,
}

impl VoiceConfig {
    pub fn new(voice_id: &str) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            style: "Conversational".to_string(),
            rate: 0,
            pitch: 0,
            variation: 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoiceConfigRequest<'a> {
    pub voice_config: &'a VoiceConfig,
    pub context_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TextRequest<'a> {
    pub context_id: &'a str,
    pub text: &'a str,
    pub end: bool,
}

/// Audio frames arrive base64-encoded; the last one of a context carries
/// `final: true`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerEvent {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
