use base64::Engine;
use serde::Serialize;

/// Events a speech recognition provider reports back to a session.
///
/// Providers translate their own wire messages into this enum; the turn
/// accumulator is the only consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Begin,
    Partial(String),
    Final(String),
    Error(String),
    Terminated,
}

/// One piece of an assistant reply, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment(String);

impl TextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Pcm,
}

/// Encoded audio produced by a synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    bytes: Vec<u8>,
    format: AudioFormat,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        Self { bytes, format }
    }

    pub fn mp3(bytes: Vec<u8>) -> Self {
        Self::new(bytes, AudioFormat::Mp3)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard-alphabet base64 of the payload, as sent to clients.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

pub const GENERATION_START_MESSAGE: &str = "Generating AI response...";
pub const EMPTY_REPLY_MESSAGE: &str = "Response generated successfully";

/// Everything a session sends to its client, in the order it is produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "session")]
    Session { session_id: String },
    #[serde(rename = "transcript")]
    Transcript {
        text: String,
        is_final: bool,
        end_of_turn: bool,
    },
    #[serde(rename = "llm_start")]
    GenerationStart { message: String },
    #[serde(rename = "llm_chunk")]
    GenerationFragment { text: String, accumulated: String },
    #[serde(rename = "audio_chunk")]
    AudioFragment {
        audio_base64: String,
        format: AudioFormat,
    },
    #[serde(rename = "llm_complete")]
    GenerationComplete { text: String },
    #[serde(rename = "llm_error")]
    GenerationError { message: String },
    #[serde(rename = "error")]
    Error { message: String },
}

impl OutboundEvent {
    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        Self::Transcript {
            text: text.into(),
            is_final,
            end_of_turn: is_final,
        }
    }

    pub fn generation_start() -> Self {
        Self::GenerationStart {
            message: GENERATION_START_MESSAGE.to_string(),
        }
    }

    pub fn audio(payload: &AudioPayload) -> Self {
        Self::AudioFragment {
            audio_base64: payload.to_base64(),
            format: payload.format(),
        }
    }

    pub fn generation_complete(reply: &str) -> Self {
        let text = if reply.is_empty() {
            EMPTY_REPLY_MESSAGE
        } else {
            reply
        };
        Self::GenerationComplete {
            text: text.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire discriminator, useful for logging without serializing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Transcript { .. } => "transcript",
            Self::GenerationStart { .. } => "llm_start",
            Self::GenerationFragment { .. } => "llm_chunk",
            Self::AudioFragment { .. } => "audio_chunk",
            Self::GenerationComplete { .. } => "llm_complete",
            Self::GenerationError { .. } => "llm_error",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcript_serializes_with_type_tag() {
        let event = OutboundEvent::transcript("hello there", true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "transcript",
                "text": "hello there",
                "is_final": true,
                "end_of_turn": true
            })
        );
    }

    #[test]
    fn audio_fragment_carries_base64_and_format() {
        let payload = AudioPayload::mp3(b"MOCK_AUDIO_FOR_HI".to_vec());
        let value = serde_json::to_value(OutboundEvent::audio(&payload)).unwrap();
        assert_eq!(value["type"], "audio_chunk");
        assert_eq!(value["format"], "mp3");
        assert_eq!(value["audio_base64"], "TU9DS19BVURJT19GT1JfSEk=");
    }

    #[test]
    fn empty_reply_completes_with_placeholder_text() {
        match OutboundEvent::generation_complete("") {
            OutboundEvent::GenerationComplete { text } => {
                assert_eq!(text, EMPTY_REPLY_MESSAGE)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(OutboundEvent::generation_start().kind(), "llm_start");
    }
}
