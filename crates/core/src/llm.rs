use crate::history::{Role, Turn};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Incremental reply text as it arrives from the provider.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A streaming text-generation provider.
///
/// Implementations are seeded with the persona, the bounded history window
/// and the new prompt, and hand back reply text as it is produced. An `Err`
/// item ends the reply.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn stream_reply(
        &self,
        persona: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<FragmentStream>;
}

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Gemini `streamGenerateContent` over server-sent events.
pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(persona: &str, history: &[Turn], prompt: &str) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role() {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": turn.text() }] })
            })
            .collect();
        contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": prompt }] }));

        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": persona }] },
            "contents": contents,
        })
    }
}

/// Pulls the reply text out of one SSE line. Non-data lines and chunks
/// without text yield `None`.
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<String>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let chunk: StreamChunk =
        serde_json::from_str(data).context("Failed to parse generation chunk")?;
    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();
    Ok((!text.is_empty()).then_some(text))
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: Vec<u8>,
    done: bool,
}

fn sse_fragments(body: BoxStream<'static, reqwest::Result<bytes::Bytes>>) -> FragmentStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(&line) {
                    Ok(Some(text)) => return Some((Ok(text), state)),
                    Ok(None) => continue,
                    Err(e) => {
                        state.done = true;
                        state.buffer.clear();
                        return Some((Err(e), state));
                    }
                }
            }
            if state.done {
                if state.buffer.is_empty() {
                    return None;
                }
                // Flush a final line that arrived without a trailing newline.
                state.buffer.push(b'\n');
                continue;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    state.done = true;
                    state.buffer.clear();
                    return Some((Err(anyhow!(e).context("Generation stream interrupted")), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn stream_reply(
        &self,
        persona: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<FragmentStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&Self::request_body(persona, history, prompt))
            .send()
            .await
            .context("Failed to reach the generation provider")?
            .error_for_status()
            .context("Generation provider rejected the request")?;

        tracing::debug!("generation stream opened ({} history turns)", history.len());
        Ok(sse_fragments(response.bytes_stream().boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_yield_candidate_text() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn other_lines_are_skipped() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_sse_line(r#"data: {"candidates":[]}"#).unwrap(), None);
    }

    #[test]
    fn malformed_data_is_an_error() {
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[tokio::test]
    async fn fragments_survive_chunk_boundaries() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi \"}]}}]}\n\ndata: {\"cand",
            )),
            Ok(bytes::Bytes::from_static(
                b"idates\":[{\"content\":{\"parts\":[{\"text\":\"there\"}]}}]}",
            )),
        ];
        let fragments: Vec<String> = sse_fragments(stream::iter(chunks).boxed())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hi ", "there"]);
    }

    #[test]
    fn history_maps_to_user_and_model_roles() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello!")];
        let body = GeminiClient::request_body("be nice", &history, "how are you");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be nice");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "how are you");
    }
}
