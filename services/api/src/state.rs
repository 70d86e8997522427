//! Application state shared by every handler.

use crate::config::SynthProvider;
use meraki_core::{Credentials, Pipeline, SessionRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub pipeline: Arc<Pipeline>,
    pub credentials: Arc<Credentials>,
    pub synth_provider: SynthProvider,
}

impl AppState {
    pub fn new(pipeline: Pipeline, credentials: Credentials, synth_provider: SynthProvider) -> Self {
        Self {
            registry: SessionRegistry::new(pipeline.config.history_cap),
            pipeline: Arc::new(pipeline),
            credentials: Arc::new(credentials),
            synth_provider,
        }
    }
}
