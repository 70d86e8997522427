mod assemblyai_adapter;
mod config;
mod error;
mod murf_adapter;
mod prompt_loader;
mod routes;
mod state;

use crate::assemblyai_adapter::AssemblyAiRecognizer;
use crate::config::{Config, SynthProvider};
use crate::murf_adapter::MurfStreamingSynth;
use crate::state::AppState;
use anyhow::{Context, Result};
use clap::Parser;
use meraki_core::feed::NewsApiClient;
use meraki_core::llm::GeminiClient;
use meraki_core::responder::{DEFAULT_PERSONA, ResponseGenerator};
use meraki_core::synth::{MockSpeech, MurfRestClient, VoiceSynthesizer};
use meraki_core::{Pipeline, PipelineConfig};
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Meraki real-time voice agent")]
struct Cli {
    /// Overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
}

/// Clients are built even without a key so `/health` can report what is
/// missing; sessions refuse to start until every required key is present.
fn secret_or_empty(key: &Option<SecretString>) -> SecretString {
    match key {
        Some(k) => SecretString::from(k.expose_secret().to_owned()),
        None => SecretString::from(String::new()),
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let keys = &config.credentials;
    let pipeline_config = PipelineConfig::default();

    let persona = match &config.persona_path {
        Some(path) => prompt_loader::load_persona(path).context("Failed to load persona")?,
        None => DEFAULT_PERSONA.trim().to_string(),
    };
    let generator = ResponseGenerator::new(
        Arc::new(GeminiClient::new(
            secret_or_empty(&keys.generation),
            config.gemini_model.clone(),
        )),
        Arc::new(NewsApiClient::new(secret_or_empty(&keys.feed))),
    )
    .with_persona(persona)
    .with_history_cap(pipeline_config.history_cap)
    .with_timeouts(config.request_timeout, config.fragment_timeout);

    let synthesizer = match config.synth_provider {
        SynthProvider::Mock => VoiceSynthesizer::new(Arc::new(MockSpeech)),
        SynthProvider::Murf => {
            let key = secret_or_empty(&keys.synthesis);
            let rest = MurfRestClient::new(secret_or_empty(&keys.synthesis))
                .context("Failed to build Murf REST client")?;
            VoiceSynthesizer::new(Arc::new(MurfStreamingSynth::new(key)))
                .with_secondary(Arc::new(rest))
        }
    }
    .with_fallback_file(config.fallback_audio_path.clone())
    .with_voice(config.voice_id.clone());

    Ok(Pipeline {
        recognizer: Arc::new(AssemblyAiRecognizer::new(secret_or_empty(&keys.speech))),
        generator: Arc::new(generator),
        synthesizer: Arc::new(synthesizer),
        config: pipeline_config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Initialize Logging ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meraki_api=info,meraki_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_timer(ChronoLocal::rfc_3339()))
        .init();

    // --- 2. Load Configuration ---
    let args = Cli::parse();
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Err(e) = config.credentials.validate() {
        warn!("{}; sessions will be refused until it is set", e);
    }
    info!("Configuration loaded. Voice provider: {:?}", config.synth_provider);

    // --- 3. Build the pipeline ---
    let pipeline = build_pipeline(&config)?;
    let app = routes::create_router(
        AppState::new(pipeline, config.credentials, config.synth_provider),
        &config.static_dir,
    );

    // --- 4. Serve ---
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Server listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
