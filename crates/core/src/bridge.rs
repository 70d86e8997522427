//! Audio ingestion bridge.
//!
//! The transport receive loop pushes frames in with [`AudioSender::offer`],
//! which never blocks. The recognizer worker thread pulls them out through
//! [`AudioSource`], a plain blocking iterator that yields a silence frame
//! whenever nothing arrives within the poll timeout.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub capacity: usize,
    pub poll_timeout: Duration,
    pub silence_frame_bytes: usize,
}

impl From<&crate::config::PipelineConfig> for BridgeConfig {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            capacity: config.audio_queue_capacity,
            poll_timeout: config.poll_timeout,
            silence_frame_bytes: config.silence_frame_bytes,
        }
    }
}

/// Creates a connected sender/source pair sharing one liveness flag.
pub fn audio_bridge(config: BridgeConfig) -> (AudioSender, AudioSource) {
    let (tx, rx) = crossbeam_channel::bounded(config.capacity.max(1));
    let alive = Arc::new(AtomicBool::new(true));
    (
        AudioSender {
            tx,
            alive: alive.clone(),
        },
        AudioSource {
            rx,
            alive,
            poll_timeout: config.poll_timeout,
            silence: vec![0u8; config.silence_frame_bytes],
        },
    )
}

#[derive(Debug, Clone)]
pub struct AudioSender {
    tx: Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
}

impl AudioSender {
    /// Enqueues one frame. Returns `false` when the queue is full or the
    /// bridge has been closed; the frame is dropped in both cases.
    pub fn offer(&self, frame: Vec<u8>) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                tracing::trace!("audio queue full, dropping {} bytes", frame.len());
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Clears the liveness flag; the source ends on its next poll.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Pull side of the bridge, owned by the recognizer worker thread.
#[derive(Debug)]
pub struct AudioSource {
    rx: Receiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
    poll_timeout: Duration,
    silence: Vec<u8>,
}

impl Iterator for AudioSource {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if !self.alive.load(Ordering::SeqCst) {
            return None;
        }
        match self.rx.recv_timeout(self.poll_timeout) {
            Ok(frame) => Some(frame),
            // Liveness may have been cleared while we were waiting.
            Err(RecvTimeoutError::Timeout) if self.alive.load(Ordering::SeqCst) => {
                Some(self.silence.clone())
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
