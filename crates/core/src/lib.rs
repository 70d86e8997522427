pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod history;
pub mod llm;
pub mod recognizer;
pub mod registry;
pub mod responder;
pub mod session;
pub mod synth;
pub mod turn;

pub use config::{Credentials, PipelineConfig};
pub use error::{ConfigError, SessionError};
pub use events::{AudioFormat, AudioPayload, OutboundEvent, RecognitionEvent, TextFragment};
pub use history::{Role, Turn};
pub use registry::SessionRegistry;
pub use session::{Pipeline, Session, SessionHandle, SessionState};

/// Text control message a client sends once it has no more audio.
pub const END_OF_INPUT: &str = "EOF";
