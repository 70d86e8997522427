use crate::config::SynthProvider;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use meraki_core::{END_OF_INPUT, OutboundEvent, Role, Session, SessionError};
use serde_json::{Value, json};
use std::path::Path as FsPath;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub fn create_router(state: AppState, static_dir: &FsPath) -> Router {
    // Permissive CORS so a separately hosted frontend can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/audio", get(ws_handler))
        .route(
            "/agent/history/{session_id}",
            get(get_history).delete(clear_history),
        )
        .route("/health", get(health))
        .route("/ready", get(ready))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(event: &OutboundEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}

/// Runs one client connection: binary frames feed the session's audio
/// bridge, the end-of-input sentinel drains it, and a single writer task
/// forwards every session event to the socket in order.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<OutboundEvent>();

    let handle = match Session::start(
        state.pipeline.clone(),
        state.registry.clone(),
        &state.credentials,
        events_tx,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("session refused: {}", e);
            if let Some(message) = encode(&OutboundEvent::error(e.client_message())) {
                let _ = sink.send(message).await;
            }
            let _ = sink.close().await;
            return;
        }
    };
    info!(session = %handle.id(), "WebSocket connection established");

    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let Some(message) = encode(&event) else {
                continue;
            };
            if sink.send(message).await.is_err() {
                debug!("client went away while sending");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut dropped = 0usize;
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(bytes)) => {
                if !handle.offer_audio(bytes.to_vec()) {
                    dropped += 1;
                }
            }
            Ok(Message::Text(text)) if text.as_str().trim() == END_OF_INPUT => {
                handle.end_of_input();
            }
            Ok(Message::Text(text)) => {
                debug!("ignoring {} byte text message", text.len());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                info!("WebSocket error: {}", e);
                break;
            }
        }
    }
    if dropped > 0 {
        debug!("{} audio frames dropped on a full queue", dropped);
    }

    let id = handle.id().to_string();
    handle.disconnect();
    handle.closed().await;
    let _ = writer.await;
    info!(session = %id, "WebSocket connection closed");
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if session_id.trim().is_empty() {
        return Err(ApiError::bad_request("session id must not be empty"));
    }
    let ts = chrono::Local::now().to_rfc3339();
    let history: Vec<Value> = state
        .registry
        .history(&session_id)
        .iter()
        .map(|turn| {
            let role = match turn.role() {
                Role::User => "user",
                Role::Assistant => "ai",
            };
            json!({ "role": role, "content": turn.text(), "ts": ts })
        })
        .collect();
    Ok(Json(json!({ "history": history })))
}

async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.registry.clear(&session_id);
    info!("Cleared history for session: {}", session_id);
    Json(json!({ "message": "History cleared", "session_id": session_id }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let keys = state.credentials.status();
    let voice = match state.synth_provider {
        SynthProvider::Murf => "murf",
        SynthProvider::Mock => "mock",
    };
    Json(json!({
        "status": "healthy",
        "service": "Meraki voice agent",
        "apis": {
            "assemblyai": keys.speech,
            "gemini": keys.generation,
            "murf": keys.synthesis,
            "news": keys.feed,
        },
        "features": {
            "streaming_llm": true,
            "streaming_audio": true,
            "websocket_integration": true,
            "base64_audio": true,
            "news_augmentation": true,
            "voice_provider": voice,
        },
        "murf_context_id": murf_realtime::DEFAULT_CONTEXT_ID,
        "active_sessions": state.registry.len(),
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}

/// 200 when a session could start right now, 503 naming what is missing
/// otherwise.
async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .credentials
        .validate()
        .map_err(|e| ApiError::from(SessionError::from(e)))?;
    Ok(Json(json!({ "status": "ready" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meraki_core::feed::NewsApiClient;
    use meraki_core::llm::GeminiClient;
    use meraki_core::responder::ResponseGenerator;
    use meraki_core::synth::{MockSpeech, VoiceSynthesizer};
    use meraki_core::{Credentials, Pipeline, PipelineConfig, Turn};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn state(credentials: Credentials) -> AppState {
        let key = || SecretString::from("unused".to_string());
        let pipeline = Pipeline {
            recognizer: Arc::new(crate::assemblyai_adapter::AssemblyAiRecognizer::new(key())),
            generator: Arc::new(ResponseGenerator::new(
                Arc::new(GeminiClient::new(key(), "gemini-1.5-flash".into())),
                Arc::new(NewsApiClient::new(key())),
            )),
            synthesizer: Arc::new(VoiceSynthesizer::new(Arc::new(MockSpeech))),
            config: PipelineConfig::default(),
        };
        AppState::new(pipeline, credentials, SynthProvider::Mock)
    }

    #[tokio::test]
    async fn history_is_reported_with_client_roles() {
        let state = state(Credentials::default());
        let id = state.registry.create();
        state
            .registry
            .commit(&id, 0, vec![Turn::user("hi"), Turn::assistant("hello!")]);

        let Json(body) = get_history(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(body["history"][0]["role"], "user");
        assert_eq!(body["history"][1]["role"], "ai");
        assert_eq!(body["history"][1]["content"], "hello!");

        let Json(cleared) = clear_history(State(state.clone()), Path(id.clone())).await;
        assert_eq!(cleared["message"], "History cleared");
        let Json(body) = get_history(State(state), Path(id)).await.unwrap();
        assert_eq!(body["history"], json!([]));
    }

    #[tokio::test]
    async fn unknown_sessions_have_empty_history() {
        let Json(body) = get_history(State(state(Credentials::default())), Path("nope".into()))
            .await
            .unwrap();
        assert_eq!(body["history"], json!([]));
    }

    #[tokio::test]
    async fn health_reports_key_presence_without_values() {
        let credentials = Credentials {
            speech: Some(SecretString::from("aai".to_string())),
            ..Credentials::default()
        };
        let Json(body) = health(State(state(credentials))).await;
        assert_eq!(body["apis"]["assemblyai"], true);
        assert_eq!(body["apis"]["gemini"], false);
        assert_eq!(body["features"]["voice_provider"], "mock");
        assert!(!body.to_string().contains("aai\""));
    }

    #[tokio::test]
    async fn readiness_requires_every_key() {
        let err = ready(State(state(Credentials::default()))).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
