use crate::types::{ServerEvent, TextRequest, VoiceConfig, VoiceConfigRequest};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub const STREAM_URL: &str = "wss://api.murf.ai/v1/speech/stream-input";
pub const DEFAULT_CONTEXT_ID: &str = "murf-streaming-context-2024";
pub const SAMPLE_RATE: u32 = 44_100;

/// A client for Murf's streaming text-to-speech WebSocket.
pub struct Client {
    write: WsWriter,
    read: WsReader,
    context_id: String,
}

/// Establishes a connection to the streaming endpoint.
pub async fn connect(base_url: &str, api_key: &SecretString) -> Result<Client> {
    let url = format!(
        "{}?api-key={}&sample_rate={}&channel_type=MONO&format=MP3&context_id={}",
        base_url,
        api_key.expose_secret(),
        SAMPLE_RATE,
        DEFAULT_CONTEXT_ID
    );
    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Murf WebSocket")?;

    tracing::debug!("Connected to Murf WebSocket.");
    let (write, read) = ws_stream.split();
    Ok(Client {
        write,
        read,
        context_id: DEFAULT_CONTEXT_ID.to_string(),
    })
}

impl Client {
    pub async fn send_voice_config(&mut self, voice: &VoiceConfig) -> Result<()> {
        let json = serde_json::to_string(&VoiceConfigRequest {
            voice_config: voice,
            context_id: &self.context_id,
        })?;
        self.write
            .send(Message::Text(json))
            .await
            .context("Failed to send voice config")
    }

    /// Sends text to be spoken; `end` flushes the context.
    pub async fn send_text(&mut self, text: &str, end: bool) -> Result<()> {
        let json = serde_json::to_string(&TextRequest {
            context_id: &self.context_id,
            text,
            end,
        })?;
        self.write
            .send(Message::Text(json))
            .await
            .context("Failed to send text")
    }

    /// Reads the next event from the server.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let event: ServerEvent = serde_json::from_str(&text)
                        .context("Failed to deserialize Murf event")?;
                    return Ok(Some(event));
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!("Murf WebSocket connection closed.");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Speaks `text` in one context and returns the concatenated audio.
    pub async fn synthesize(&mut self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        self.send_voice_config(voice).await?;
        self.send_text(text, true).await?;

        let mut audio = Vec::new();
        while let Some(event) = self.next_event().await? {
            if let Some(error) = event.error {
                return Err(anyhow!("Murf reported an error: {error}"));
            }
            if let Some(chunk) = event.audio.as_deref().filter(|c| !c.is_empty()) {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(chunk)
                    .context("Murf sent invalid base64 audio")?;
                audio.extend_from_slice(&bytes);
            }
            if event.is_final {
                let _ = self.write.close().await;
                return Ok(audio);
            }
        }
        Err(anyhow!("Murf closed the stream before the final audio frame"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn serve(frames: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // voice config, then text
            let _ = ws.next().await;
            let _ = ws.next().await;
            for frame in frames {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn audio_frames_are_concatenated_until_final() {
        let url = serve(vec![
            r#"{"audio":"AAE=","final":false}"#,
            r#"{"audio":"AgM=","final":true}"#,
        ])
        .await;
        let mut client = connect(&url, &SecretString::from("key".to_string()))
            .await
            .unwrap();
        let audio = client
            .synthesize("hello", &VoiceConfig::new("en-US-natalie"))
            .await
            .unwrap();
        assert_eq!(audio, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn early_close_is_an_error() {
        let url = serve(vec![r#"{"audio":"AAE=","final":false}"#]).await;
        let mut client = connect(&url, &SecretString::from("key".to_string()))
            .await
            .unwrap();
        assert!(
            client
                .synthesize("hello", &VoiceConfig::new("en-US-natalie"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn server_errors_are_surfaced() {
        let url = serve(vec![r#"{"error":"invalid voice"}"#]).await;
        let mut client = connect(&url, &SecretString::from("key".to_string()))
            .await
            .unwrap();
        let err = client
            .synthesize("hello", &VoiceConfig::new("nobody"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid voice"));
    }
}
