use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Prompts containing any of these words (case-insensitive) get headlines
/// attached.
pub const FEED_KEYWORDS: [&str; 4] = ["news", "headlines", "latest", "happening"];
pub const MAX_FEED_ITEMS: usize = 5;
pub const FEED_UNAVAILABLE: &str = "I couldn't reach the news feed right now.";
pub const DEFAULT_FEED_QUERY: &str = "general";

pub fn wants_feed(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| FEED_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)))
}

/// A source of short headline-style text items.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch(&self, query: &str, page_size: usize) -> Result<Vec<String>>;
}

pub const NEWS_API_BASE_URL: &str = "https://newsapi.org";

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

impl Article {
    fn headline(self) -> Option<String> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        match self.source.and_then(|s| s.name) {
            Some(source) => Some(format!("{} ({})", title.trim(), source)),
            None => Some(title.trim().to_string()),
        }
    }
}

pub struct NewsApiClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: NEWS_API_BASE_URL.to_string(),
        }
    }
}

#[async_trait]
impl FeedProvider for NewsApiClient {
    async fn fetch(&self, query: &str, page_size: usize) -> Result<Vec<String>> {
        let page_size = page_size.clamp(1, MAX_FEED_ITEMS);
        let response = self
            .client
            .get(format!("{}/v2/top-headlines", self.base_url))
            .header("X-Api-Key", self.api_key.expose_secret())
            .query(&[
                ("language", "en"),
                ("category", query),
                ("pageSize", &page_size.to_string()),
            ])
            .send()
            .await
            .context("Failed to reach the news feed")?
            .error_for_status()
            .context("News feed rejected the request")?
            .json::<HeadlinesResponse>()
            .await
            .context("Failed to parse news feed response")?;

        Ok(response
            .articles
            .into_iter()
            .filter_map(Article::headline)
            .take(page_size)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_case_insensitively() {
        assert!(wants_feed("What's the LATEST?"));
        assert!(wants_feed("any news today"));
        assert!(wants_feed("What is happening in the world"));
        assert!(!wants_feed("tell me a joke"));
    }

    #[test]
    fn keywords_only_match_whole_words() {
        assert!(!wants_feed("she renews her licence"));
        assert!(!wants_feed("sign me up for the newsletter"));
        assert!(wants_feed("news, please"));
        assert!(wants_feed("what's happening?"));
    }

    #[test]
    fn headlines_carry_their_source() {
        let body = r#"{"status":"ok","articles":[
            {"title":"Rust 2.0 announced","source":{"id":null,"name":"The Register"}},
            {"title":"  ","source":{"name":"Nobody"}},
            {"title":"Untitled source","source":null}
        ]}"#;
        let parsed: HeadlinesResponse = serde_json::from_str(body).unwrap();
        let items: Vec<String> = parsed
            .articles
            .into_iter()
            .filter_map(Article::headline)
            .collect();
        assert_eq!(
            items,
            vec!["Rust 2.0 announced (The Register)", "Untitled source"]
        );
    }
}
