//! One live conversation.
//!
//! A session owns three execution contexts: the recognizer worker thread,
//! the session task below, and whichever task feeds it audio through its
//! [`SessionHandle`]. Every outbound event is written by the session task,
//! so the client sees them in production order.

use crate::bridge::{AudioSender, BridgeConfig, audio_bridge};
use crate::config::{Credentials, PipelineConfig};
use crate::error::SessionError;
use crate::events::{OutboundEvent, RecognitionEvent};
use crate::history::Turn;
use crate::recognizer::{
    RecognitionSink, RecognizerWorker, SpeechRecognizer, StreamingParameters,
};
use crate::registry::SessionRegistry;
use crate::responder::ResponseGenerator;
use crate::synth::VoiceSynthesizer;
use crate::turn::TurnAccumulator;
use futures::{StreamExt, stream};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Generating,
    Synthesizing,
    Closing,
}

/// The shared, session-independent parts of the voice pipeline.
pub struct Pipeline {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub generator: Arc<ResponseGenerator>,
    pub synthesizer: Arc<VoiceSynthesizer>,
    pub config: PipelineConfig,
}

#[derive(Debug)]
enum Control {
    EndOfInput,
    Disconnect,
}

/// Transport-facing side of a running session.
pub struct SessionHandle {
    id: String,
    audio: AudioSender,
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Never blocks. Returns `false` if the frame was dropped.
    pub fn offer_audio(&self, frame: Vec<u8>) -> bool {
        self.audio.offer(frame)
    }

    /// The client has no more audio. Any reply in flight still completes.
    pub fn end_of_input(&self) {
        let _ = self.control.send(Control::EndOfInput);
    }

    /// The client is gone. In-flight work is cancelled.
    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Waits until the session has fully shut down.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            tracing::error!(session = %self.id, "session task failed: {}", e);
        }
    }
}

pub struct Session;

impl Session {
    /// Validates credentials, registers the session and starts the
    /// recognizer worker and the session task.
    ///
    /// Nothing is registered or spawned when credentials are incomplete.
    pub fn start(
        pipeline: Arc<Pipeline>,
        registry: SessionRegistry,
        credentials: &Credentials,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> Result<SessionHandle, SessionError> {
        credentials.validate()?;

        let id = registry.create();
        let span = tracing::info_span!("session", id = %id);
        let config = pipeline.config.clone();

        let (audio, source) = audio_bridge(BridgeConfig::from(&config));
        let (recognition_tx, recognition) = mpsc::channel(config.recognition_channel_capacity);
        let worker = match RecognizerWorker::spawn(
            pipeline.recognizer.clone(),
            StreamingParameters::pcm16(config.sample_rate),
            source,
            RecognitionSink::new(recognition_tx),
            span.clone(),
        ) {
            Ok(worker) => worker,
            Err(e) => {
                registry.close(&id);
                return Err(SessionError::Upstream(e.to_string()));
            }
        };

        let (control_tx, control) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let task = SessionTask {
            id: id.clone(),
            state: state_tx,
            pipeline,
            registry,
            outbound,
            audio: audio.clone(),
            recognition,
            control,
            worker: Some(worker),
            accumulator: TurnAccumulator::new(),
            turn: None,
            closing: false,
        };
        let task = tokio::spawn(task.run().instrument(span));

        Ok(SessionHandle {
            id,
            audio,
            control: control_tx,
            state,
            task,
        })
    }
}

/// Progress reports from a turn task back to the session task.
#[derive(Debug)]
enum TurnUpdate {
    Event(OutboundEvent),
    Synthesizing,
    Finished(Option<Vec<Turn>>),
}

struct ActiveTurn {
    updates: mpsc::UnboundedReceiver<TurnUpdate>,
    task: JoinHandle<()>,
    epoch: u64,
}

struct SessionTask {
    id: String,
    state: watch::Sender<SessionState>,
    pipeline: Arc<Pipeline>,
    registry: SessionRegistry,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    audio: AudioSender,
    recognition: mpsc::Receiver<RecognitionEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    worker: Option<RecognizerWorker>,
    accumulator: TurnAccumulator,
    turn: Option<ActiveTurn>,
    closing: bool,
}

async fn next_update(turn: &mut Option<ActiveTurn>) -> Option<TurnUpdate> {
    match turn {
        Some(turn) => turn.updates.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionTask {
    async fn run(mut self) {
        let mut recognition_open = true;

        loop {
            if self.turn.is_none() && (self.closing || !recognition_open) {
                break;
            }

            let result = tokio::select! {
                control = self.control.recv() => match control {
                    Some(Control::EndOfInput) => {
                        tracing::info!("end of input received");
                        self.closing = true;
                        self.audio.close();
                        Ok(())
                    }
                    Some(Control::Disconnect) | None => {
                        tracing::info!("client disconnected");
                        break;
                    }
                },
                update = next_update(&mut self.turn) => self.on_turn_update(update),
                event = self.recognition.recv(), if recognition_open => match event {
                    Some(event) => self.on_recognition(event),
                    None => {
                        tracing::debug!("recognition stream closed");
                        recognition_open = false;
                        Ok(())
                    }
                },
            };
            if let Err(e) = result {
                tracing::warn!("{}", e);
                break;
            }
        }

        self.shutdown().await;
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!("state {:?} -> {:?}", previous, next);
        }
    }

    fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    fn send(&self, event: OutboundEvent) -> Result<(), SessionError> {
        let kind = event.kind();
        self.outbound
            .send(event)
            .map_err(|_| SessionError::Transport(format!("client went away before {kind}")))
    }

    /// The session starts listening, and announces itself, once the
    /// recognizer has shown it is connected.
    fn on_recognition(&mut self, event: RecognitionEvent) -> Result<(), SessionError> {
        let connected = matches!(
            event,
            RecognitionEvent::Begin | RecognitionEvent::Partial(_) | RecognitionEvent::Final(_)
        );
        if connected && self.current() == SessionState::Idle {
            self.transition(SessionState::Listening);
            tracing::info!("session listening");
            self.send(OutboundEvent::Session {
                session_id: self.id.clone(),
            })?;
        }

        let outcome = self.accumulator.accept(event);
        if let Some(event) = outcome.event {
            self.send(event)?;
        }
        if let Some(text) = outcome.completed {
            self.start_turn(text);
        }
        Ok(())
    }

    fn start_turn(&mut self, text: String) {
        if self.closing {
            tracing::debug!("input has ended, ignoring new turn");
            return;
        }
        if matches!(
            self.current(),
            SessionState::Generating | SessionState::Synthesizing
        ) {
            tracing::debug!("turn already in flight, dropping \"{}\"", text);
            return;
        }

        let (epoch, history) = self.registry.snapshot(&self.id).unwrap_or_default();
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            run_turn(
                self.pipeline.generator.clone(),
                self.pipeline.synthesizer.clone(),
                text,
                history,
                updates_tx,
            )
            .in_current_span(),
        );
        self.turn = Some(ActiveTurn {
            updates,
            task,
            epoch,
        });
        self.transition(SessionState::Generating);
    }

    fn on_turn_update(&mut self, update: Option<TurnUpdate>) -> Result<(), SessionError> {
        match update {
            Some(TurnUpdate::Event(event)) => self.send(event),
            Some(TurnUpdate::Synthesizing) => {
                self.transition(SessionState::Synthesizing);
                Ok(())
            }
            Some(TurnUpdate::Finished(history)) => {
                let turn = self.turn.take();
                if let (Some(turn), Some(turns)) = (turn, history) {
                    self.registry.commit(&self.id, turn.epoch, turns);
                }
                self.transition(SessionState::Listening);
                Ok(())
            }
            None => {
                // The turn task ended without reporting completion.
                self.turn = None;
                self.transition(SessionState::Listening);
                self.send(OutboundEvent::GenerationError {
                    message: "Error: response pipeline stopped unexpectedly".to_string(),
                })
            }
        }
    }

    async fn shutdown(mut self) {
        self.transition(SessionState::Closing);
        self.audio.close();
        if let Some(turn) = self.turn.take() {
            tracing::debug!("cancelling in-flight turn");
            turn.task.abort();
        }
        self.recognition.close();
        if let Some(worker) = self.worker.take() {
            worker.join(self.pipeline.config.worker_join_timeout).await;
        }
        self.registry.close(&self.id);
        tracing::info!("session closed");
    }
}

/// Generates, speaks and reports one reply. The session task forwards every
/// update to the client in the order it arrives.
async fn run_turn(
    generator: Arc<ResponseGenerator>,
    synthesizer: Arc<VoiceSynthesizer>,
    text: String,
    history: Vec<Turn>,
    updates: mpsc::UnboundedSender<TurnUpdate>,
) {
    let emit = |event: OutboundEvent| updates.send(TurnUpdate::Event(event)).is_ok();

    if !emit(OutboundEvent::generation_start()) {
        return;
    }

    let mut generation = generator.generate(&text, &history).await;
    let mut accumulated = String::new();
    let mut fragments = Vec::new();
    while let Some(fragment) = generation.next().await {
        accumulated.push_str(fragment.as_str());
        let event = OutboundEvent::GenerationFragment {
            text: fragment.as_str().to_string(),
            accumulated: accumulated.clone(),
        };
        if !emit(event) {
            return;
        }
        fragments.push(fragment);
    }
    let updated_history = generation.finish();
    tracing::info!("AI response: \"{}\"", accumulated);

    if updates.send(TurnUpdate::Synthesizing).is_err() {
        return;
    }
    let mut audio = synthesizer.synthesize(stream::iter(fragments));
    while let Some(payload) = audio.next().await {
        tracing::debug!("audio payload ready ({} bytes)", payload.bytes().len());
        if !emit(OutboundEvent::audio(&payload)) {
            return;
        }
    }

    if emit(OutboundEvent::generation_complete(&accumulated)) {
        let _ = updates.send(TurnUpdate::Finished(updated_history));
    }
}
