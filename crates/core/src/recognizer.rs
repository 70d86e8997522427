use crate::bridge::AudioSource;
use crate::events::RecognitionEvent;
use anyhow::{Context, Result};
#[cfg(test)]
use mockall::automock;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Audio format handed to the recognition provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingParameters {
    pub sample_rate: u32,
    pub format_turns: bool,
    pub encoding: String,
}

impl StreamingParameters {
    pub fn pcm16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            format_turns: true,
            encoding: "pcm_s16le".to_string(),
        }
    }
}

/// Thread-safe handoff from the worker thread to the session task.
///
/// Backed by a bounded tokio channel; `emit` blocks the worker (never the
/// session) when the session falls behind.
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    tx: mpsc::Sender<RecognitionEvent>,
}

impl RecognitionSink {
    pub fn new(tx: mpsc::Sender<RecognitionEvent>) -> Self {
        Self { tx }
    }

    /// Must only be called from outside the async runtime. Returns `false`
    /// once the session has stopped listening.
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        self.tx.blocking_send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A blocking, pull-driven speech recognition client.
///
/// `stream` runs on a dedicated worker thread. It pulls audio until the
/// source ends, reports everything it hears through `events`, and returns
/// once the provider connection is closed.
#[cfg_attr(test, automock)]
pub trait SpeechRecognizer: Send + Sync {
    fn stream(
        &self,
        params: &StreamingParameters,
        audio: AudioSource,
        events: RecognitionSink,
    ) -> Result<()>;
}

/// Owns the worker thread driving one recognizer for one session.
pub struct RecognizerWorker {
    handle: JoinHandle<()>,
    done: oneshot::Receiver<()>,
}

impl RecognizerWorker {
    pub fn spawn(
        recognizer: std::sync::Arc<dyn SpeechRecognizer>,
        params: StreamingParameters,
        audio: AudioSource,
        events: RecognitionSink,
        span: tracing::Span,
    ) -> Result<Self> {
        let (done_tx, done) = oneshot::channel();
        let handle = std::thread::Builder::new()
            .name("speech-recognizer".to_string())
            .spawn(move || {
                let _entered = span.enter();
                tracing::debug!("recognizer worker started");
                if let Err(e) = recognizer.stream(&params, audio, events.clone()) {
                    tracing::error!("recognizer failed: {:#}", e);
                    events.emit(RecognitionEvent::Error(format!("Connection error: {e}")));
                }
                tracing::debug!("recognizer worker finished");
                let _ = done_tx.send(());
            })
            .context("Failed to spawn recognizer thread")?;
        Ok(Self { handle, done })
    }

    /// Waits up to `timeout` for the worker to finish. A worker that does not
    /// finish in time is detached and left to exit on its own.
    pub async fn join(self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.done).await {
            // A dropped sender means the thread unwound; it has finished either way.
            Ok(_) => {
                let handle = self.handle;
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(())) => true,
                    _ => {
                        tracing::warn!("recognizer worker panicked");
                        true
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    "recognizer worker did not stop within {:?}, detaching",
                    timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeConfig, audio_bridge};
    use std::sync::Arc;

    fn bridge() -> (crate::bridge::AudioSender, AudioSource) {
        audio_bridge(BridgeConfig {
            capacity: 8,
            poll_timeout: Duration::from_millis(10),
            silence_frame_bytes: 4,
        })
    }

    #[tokio::test]
    async fn worker_forwards_events_and_joins() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_stream().returning(|_, audio, events| {
            events.emit(RecognitionEvent::Begin);
            // Drain until the session closes the bridge.
            for _ in audio {}
            events.emit(RecognitionEvent::Terminated);
            Ok(())
        });

        let (tx, rx_audio) = bridge();
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let worker = RecognizerWorker::spawn(
            Arc::new(recognizer),
            StreamingParameters::pcm16(16_000),
            rx_audio,
            RecognitionSink::new(events_tx),
            tracing::Span::none(),
        )
        .unwrap();

        assert_eq!(events_rx.recv().await, Some(RecognitionEvent::Begin));
        tx.close();
        assert_eq!(events_rx.recv().await, Some(RecognitionEvent::Terminated));
        assert_eq!(events_rx.recv().await, None);
        assert!(worker.join(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn recognizer_failure_becomes_a_connection_error() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_stream()
            .returning(|_, _, _| Err(anyhow::anyhow!("handshake refused")));

        let (_tx, rx_audio) = bridge();
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let worker = RecognizerWorker::spawn(
            Arc::new(recognizer),
            StreamingParameters::pcm16(16_000),
            rx_audio,
            RecognitionSink::new(events_tx),
            tracing::Span::none(),
        )
        .unwrap();

        assert_eq!(
            events_rx.recv().await,
            Some(RecognitionEvent::Error(
                "Connection error: handshake refused".to_string()
            ))
        );
        assert!(worker.join(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn stuck_worker_is_detached_after_timeout() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_stream().returning(|_, _, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });

        let (_tx, rx_audio) = bridge();
        let (events_tx, _events_rx) = mpsc::channel(8);
        let worker = RecognizerWorker::spawn(
            Arc::new(recognizer),
            StreamingParameters::pcm16(16_000),
            rx_audio,
            RecognitionSink::new(events_tx),
            tracing::Span::none(),
        )
        .unwrap();

        assert!(!worker.join(Duration::from_millis(20)).await);
    }
}
