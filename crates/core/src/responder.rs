use crate::events::TextFragment;
use crate::feed::{DEFAULT_FEED_QUERY, FEED_UNAVAILABLE, FeedProvider, MAX_FEED_ITEMS, wants_feed};
use crate::history::{MAX_HISTORY_TURNS, Turn, window};
use crate::llm::{FragmentStream, LanguageModel};
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::time::{Sleep, sleep, timeout};

pub const FALLBACK_TEXT: &str = "I'm having trouble connecting right now. Please try again.";
pub const DEFAULT_PERSONA: &str = include_str!("../prompts/persona.md");
/// Budget for opening a reply stream or fetching headlines.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Longest silence tolerated between two reply fragments.
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Turns a completed user turn into a streamed assistant reply.
pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    feed: Arc<dyn FeedProvider>,
    persona: String,
    history_cap: usize,
    request_timeout: Duration,
    fragment_timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, feed: Arc<dyn FeedProvider>) -> Self {
        Self {
            model,
            feed,
            persona: DEFAULT_PERSONA.to_string(),
            history_cap: MAX_HISTORY_TURNS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_history_cap(mut self, history_cap: usize) -> Self {
        self.history_cap = history_cap;
        self
    }

    /// A provider that misses either deadline is treated as failed.
    pub fn with_timeouts(mut self, request: Duration, fragment: Duration) -> Self {
        self.request_timeout = request;
        self.fragment_timeout = fragment;
        self
    }

    /// Starts generating a reply to `text`.
    ///
    /// Never fails: provider errors turn into a single fallback fragment and
    /// leave the history untouched.
    pub async fn generate(&self, text: &str, history: &[Turn]) -> Generation {
        let context = window(history, self.history_cap).to_vec();
        let prompt = self.augment(text).await;

        let request = self.model.stream_reply(&self.persona, &context, &prompt);
        let (inner, outcome) = match timeout(self.request_timeout, request).await {
            Ok(Ok(stream)) => (Some(stream), Outcome::Pending),
            Ok(Err(e)) => {
                tracing::warn!("generation request failed: {:#}", e);
                (None, Outcome::Failed)
            }
            Err(_) => {
                tracing::warn!("generation request timed out after {:?}", self.request_timeout);
                (None, Outcome::Failed)
            }
        };
        Generation {
            inner,
            idle: None,
            fragment_timeout: self.fragment_timeout,
            reply: String::new(),
            fallback_pending: outcome == Outcome::Failed,
            outcome,
            context,
            user_text: text.to_string(),
            history_cap: self.history_cap,
        }
    }

    async fn augment(&self, text: &str) -> String {
        if !wants_feed(text) {
            return text.to_string();
        }
        let fetch = self.feed.fetch(DEFAULT_FEED_QUERY, MAX_FEED_ITEMS);
        let block = match timeout(self.request_timeout, fetch).await {
            Ok(Ok(items)) if !items.is_empty() => {
                let lines: Vec<String> = items
                    .iter()
                    .take(MAX_FEED_ITEMS)
                    .map(|item| format!("- {item}"))
                    .collect();
                format!("Current headlines:\n{}", lines.join("\n"))
            }
            Ok(Ok(_)) => FEED_UNAVAILABLE.to_string(),
            Ok(Err(e)) => {
                tracing::warn!("news feed unavailable: {:#}", e);
                FEED_UNAVAILABLE.to_string()
            }
            Err(_) => {
                tracing::warn!("news feed did not answer within {:?}", self.request_timeout);
                FEED_UNAVAILABLE.to_string()
            }
        };
        format!("{block}\n\n{text}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Completed,
    Failed,
}

/// One in-progress reply. Single pass: once drained it cannot be replayed.
///
/// Dropping it before it is drained abandons the generation and leaves the
/// session history untouched.
pub struct Generation {
    inner: Option<FragmentStream>,
    /// Armed while waiting for the next fragment.
    idle: Option<Pin<Box<Sleep>>>,
    fragment_timeout: Duration,
    reply: String,
    outcome: Outcome,
    fallback_pending: bool,
    context: Vec<Turn>,
    user_text: String,
    history_cap: usize,
}

impl Generation {
    /// The updated history window, available only when the reply completed
    /// successfully with some text. An empty reply leaves history as it was.
    pub fn finish(self) -> Option<Vec<Turn>> {
        if self.outcome != Outcome::Completed || self.reply.trim().is_empty() {
            return None;
        }
        let mut turns = self.context;
        turns.push(Turn::user(self.user_text));
        turns.push(Turn::assistant(self.reply));
        let start = turns.len().saturating_sub(self.history_cap);
        Some(turns.split_off(start))
    }

    fn fail(&mut self) -> Poll<Option<TextFragment>> {
        self.inner = None;
        self.idle = None;
        self.outcome = Outcome::Failed;
        Poll::Ready(Some(TextFragment::new(FALLBACK_TEXT)))
    }
}

impl Stream for Generation {
    type Item = TextFragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TextFragment>> {
        let this = self.get_mut();
        if this.fallback_pending {
            this.fallback_pending = false;
            return Poll::Ready(Some(TextFragment::new(FALLBACK_TEXT)));
        }

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };
            let item = match inner.poll_next_unpin(cx) {
                Poll::Ready(item) => item,
                Poll::Pending => {
                    let fragment_timeout = this.fragment_timeout;
                    let idle = this
                        .idle
                        .get_or_insert_with(|| Box::pin(sleep(fragment_timeout)));
                    ready!(idle.poll_unpin(cx));
                    tracing::warn!("no reply text for {:?}, giving up", fragment_timeout);
                    return this.fail();
                }
            };
            this.idle = None;
            match item {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => {
                    this.reply.push_str(&text);
                    return Poll::Ready(Some(TextFragment::new(text)));
                }
                Some(Err(e)) => {
                    tracing::warn!("generation interrupted: {:#}", e);
                    return this.fail();
                }
                None => {
                    if this.reply.trim().is_empty() {
                        tracing::info!("generation finished without any text");
                    }
                    this.inner = None;
                    this.outcome = Outcome::Completed;
                    return Poll::Ready(None);
                }
            }
        }
    }
}
