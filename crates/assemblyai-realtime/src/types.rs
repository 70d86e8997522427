use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Begin {
    pub id: String,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// One transcript update. The same `turn_order` is reported repeatedly as the
/// turn grows; `end_of_turn` marks the last unformatted update and, when
/// formatting is on, a second message repeats it with `turn_is_formatted`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnMessage {
    #[serde(default)]
    pub turn_order: u32,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub end_of_turn: bool,
    #[serde(default)]
    pub turn_is_formatted: bool,
    #[serde(default)]
    pub end_of_turn_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Termination {
    #[serde(default)]
    pub audio_duration_seconds: f64,
    #[serde(default)]
    pub session_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Begin(Begin),
    Turn(TurnMessage),
    Termination(Termination),
    /// Reported as `{"error": "..."}` without a type tag.
    #[serde(skip)]
    Error(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("Server message is not JSON")?;
        if let Some(error) = value.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(Self::Error(message));
        }
        serde_json::from_value(value).context("Unrecognised server message")
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Terminate,
}
