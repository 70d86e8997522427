use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;

pub const BASE_URL: &str = "wss://streaming.assemblyai.com/v3/ws";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub struct Config {
    base_url: String,
    api_key: SecretString,
    sample_rate: u32,
    format_turns: bool,
    encoding: String,
    poll_interval: Duration,
    termination_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                base_url: BASE_URL.to_string(),
                api_key: SecretString::from(String::new()),
                sample_rate: 16_000,
                format_turns: true,
                encoding: "pcm_s16le".to_string(),
                poll_interval: Duration::from_millis(10),
                termination_timeout: Duration::from_secs(5),
            },
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.config.api_key = api_key;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn with_format_turns(mut self, format_turns: bool) -> Self {
        self.config.format_turns = format_turns;
        self
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.config.encoding = encoding.to_string();
        self
    }

    /// How long to wait for server messages between audio frames.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    pub fn with_termination_timeout(mut self, timeout: Duration) -> Self {
        self.config.termination_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn url(&self) -> String {
        format!(
            "{}?sample_rate={}&format_turns={}&encoding={}",
            self.base_url, self.sample_rate, self.format_turns, self.encoding
        )
    }

    pub fn format_turns(&self) -> bool {
        self.format_turns
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn termination_timeout(&self) -> Duration {
        self.termination_timeout
    }

    pub(crate) fn request(&self) -> Result<Request> {
        let mut request = self
            .url()
            .into_client_request()
            .context("Invalid streaming URL")?;
        let token = HeaderValue::from_str(self.api_key.expose_secret())
            .context("API key is not a valid header value")?;
        request.headers_mut().insert(AUTHORIZATION_HEADER, token);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_the_audio_format() {
        let config = Config::builder().build();
        assert_eq!(
            config.url(),
            "wss://streaming.assemblyai.com/v3/ws?sample_rate=16000&format_turns=true&encoding=pcm_s16le"
        );
    }

    #[test]
    fn request_is_authorized() {
        let config = Config::builder()
            .with_api_key(SecretString::from("secret".to_string()))
            .build();
        let request = config.request().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION_HEADER], "secret");
    }
}
