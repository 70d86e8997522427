use anyhow::Result;
use assemblyai_realtime::types::ServerMessage;
use meraki_core::RecognitionEvent;
use meraki_core::bridge::AudioSource;
use meraki_core::recognizer::{RecognitionSink, SpeechRecognizer, StreamingParameters};
use secrecy::{ExposeSecret, SecretString};

/// Runs AssemblyAI's v3 streaming recognizer on the session's worker thread.
pub struct AssemblyAiRecognizer {
    api_key: SecretString,
}

impl AssemblyAiRecognizer {
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }
}

/// Maps a server message onto the pipeline's recognition events.
///
/// With formatted turns enabled the service reports every finished turn
/// twice: raw, then formatted. Only the formatted copy counts as final.
pub fn translate(message: ServerMessage, format_turns: bool) -> Option<RecognitionEvent> {
    match message {
        ServerMessage::Begin(begin) => {
            tracing::info!("Streaming session started: {}", begin.id);
            Some(RecognitionEvent::Begin)
        }
        ServerMessage::Turn(turn) => {
            if turn.transcript.trim().is_empty() {
                return None;
            }
            let is_final = turn.end_of_turn && (turn.turn_is_formatted || !format_turns);
            Some(if is_final {
                RecognitionEvent::Final(turn.transcript)
            } else {
                RecognitionEvent::Partial(turn.transcript)
            })
        }
        ServerMessage::Termination(_) => Some(RecognitionEvent::Terminated),
        ServerMessage::Error(message) => Some(RecognitionEvent::Error(message)),
    }
}

impl SpeechRecognizer for AssemblyAiRecognizer {
    fn stream(
        &self,
        params: &StreamingParameters,
        audio: AudioSource,
        events: RecognitionSink,
    ) -> Result<()> {
        let config = assemblyai_realtime::Config::builder()
            .with_api_key(SecretString::from(self.api_key.expose_secret().to_owned()))
            .with_sample_rate(params.sample_rate)
            .with_format_turns(params.format_turns)
            .with_encoding(&params.encoding)
            .build();
        let mut client = assemblyai_realtime::connect(&config)?;

        let mut terminated = false;
        client.stream(audio, |message| match translate(message, params.format_turns) {
            Some(event) => {
                terminated |= event == RecognitionEvent::Terminated;
                events.emit(event)
            }
            None => !events.is_closed(),
        })?;

        if !terminated {
            events.emit(RecognitionEvent::Terminated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assemblyai_realtime::types::{Termination, TurnMessage};

    fn turn(transcript: &str, end_of_turn: bool, formatted: bool) -> ServerMessage {
        ServerMessage::Turn(TurnMessage {
            turn_order: 0,
            transcript: transcript.to_string(),
            end_of_turn,
            turn_is_formatted: formatted,
            end_of_turn_confidence: 0.9,
        })
    }

    #[test]
    fn only_the_formatted_end_of_turn_is_final() {
        assert_eq!(
            translate(turn("hello there", false, false), true),
            Some(RecognitionEvent::Partial("hello there".into()))
        );
        assert_eq!(
            translate(turn("hello there", true, false), true),
            Some(RecognitionEvent::Partial("hello there".into()))
        );
        assert_eq!(
            translate(turn("Hello there.", true, true), true),
            Some(RecognitionEvent::Final("Hello there.".into()))
        );
    }

    #[test]
    fn unformatted_streams_finalize_on_end_of_turn() {
        assert_eq!(
            translate(turn("hello", true, false), false),
            Some(RecognitionEvent::Final("hello".into()))
        );
    }

    #[test]
    fn empty_transcripts_are_skipped() {
        assert_eq!(translate(turn("  ", true, true), true), None);
    }

    #[test]
    fn lifecycle_and_errors_are_forwarded() {
        assert_eq!(
            translate(
                ServerMessage::Termination(Termination {
                    audio_duration_seconds: 1.0,
                    session_duration_seconds: 1.2
                }),
                true
            ),
            Some(RecognitionEvent::Terminated)
        );
        assert_eq!(
            translate(ServerMessage::Error("bad key".into()), true),
            Some(RecognitionEvent::Error("bad key".into()))
        );
    }
}
