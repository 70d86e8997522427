use crate::events::{OutboundEvent, RecognitionEvent};

/// What the session should do with one recognition event.
#[derive(Debug, Default, PartialEq)]
pub struct TurnOutcome {
    /// Event to forward to the client, if any.
    pub event: Option<OutboundEvent>,
    /// Text of a completed user turn.
    pub completed: Option<String>,
}

/// Decides where speaking turns end.
///
/// Partials are forwarded as they arrive, finals close a turn when they carry
/// any non-whitespace text. Errors are surfaced but never retried here.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    terminated: bool,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, event: RecognitionEvent) -> TurnOutcome {
        if self.terminated {
            tracing::debug!("recognition already terminated, ignoring {:?}", event);
            return TurnOutcome::default();
        }

        match event {
            RecognitionEvent::Begin => {
                tracing::debug!("recognition stream started");
                TurnOutcome::default()
            }
            RecognitionEvent::Partial(text) => TurnOutcome {
                event: Some(OutboundEvent::transcript(text, false)),
                completed: None,
            },
            RecognitionEvent::Final(text) => {
                let trimmed = text.trim();
                let completed = (!trimmed.is_empty()).then(|| trimmed.to_string());
                if completed.is_some() {
                    tracing::info!("User said: \"{}\"", trimmed);
                }
                TurnOutcome {
                    event: Some(OutboundEvent::transcript(text, true)),
                    completed,
                }
            }
            RecognitionEvent::Error(message) => {
                tracing::error!("recognition error: {}", message);
                TurnOutcome {
                    event: Some(OutboundEvent::error(message)),
                    completed: None,
                }
            }
            RecognitionEvent::Terminated => {
                tracing::info!("recognition stream terminated");
                self.terminated = true;
                TurnOutcome::default()
            }
        }
    }
}
