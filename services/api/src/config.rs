use meraki_core::ConfigError;
use meraki_core::config::{
    Credentials, FEED_KEY_NAME, GENERATION_KEY_NAME, SPEECH_KEY_NAME, SYNTHESIS_KEY_NAME,
};
use meraki_core::responder::{DEFAULT_FRAGMENT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use meraki_core::synth::{DEFAULT_FALLBACK_AUDIO_PATH, DEFAULT_VOICE_ID};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which voice provider speaks the replies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SynthProvider {
    Murf,
    /// Offline placeholder audio, no key required.
    Mock,
}

/// Holds all configuration loaded from the environment at startup.
pub struct Config {
    pub bind_address: SocketAddr,
    pub credentials: Credentials,
    pub synth_provider: SynthProvider,
    pub gemini_model: String,
    pub voice_id: String,
    pub fallback_audio_path: PathBuf,
    pub static_dir: PathBuf,
    pub persona_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub fragment_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "127.0.0.1:8000".
    /// *   `ASSEMBLYAI_API_KEY`, `GEMINI_API_KEY`, `MURF_API_KEY`, `NEWS_API_KEY`: provider keys.
    ///     Missing keys are reported by `/health` and refused when a session starts.
    /// *   `SYNTH_PROVIDER`: "murf" or "mock". Defaults to "murf".
    /// *   `GEMINI_MODEL`: (Optional) Defaults to "gemini-1.5-flash".
    /// *   `MURF_VOICE_ID`: (Optional) Defaults to "en-US-natalie".
    /// *   `FALLBACK_AUDIO_PATH`: (Optional) Defaults to "static/fallback.mp3".
    /// *   `STATIC_DIR`: (Optional) Defaults to "static".
    /// *   `PERSONA_PATH`: (Optional) Markdown file replacing the built-in persona.
    /// *   `PROVIDER_TIMEOUT_SECS`: (Optional) Budget for opening a reply or fetching headlines. Defaults to 15.
    /// *   `FRAGMENT_TIMEOUT_SECS`: (Optional) Longest gap between reply fragments. Defaults to 20.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = lookup("SYNTH_PROVIDER").unwrap_or_else(|| "murf".to_string());
        let synth_provider = match provider_str.to_lowercase().as_str() {
            "murf" => SynthProvider::Murf,
            "mock" => SynthProvider::Mock,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SYNTH_PROVIDER".to_string(),
                    format!("'{}' is not one of murf, mock", other),
                ));
            }
        };

        let seconds = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                    _ => Err(ConfigError::InvalidValue(
                        key.to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    )),
                },
            }
        };
        let request_timeout = seconds("PROVIDER_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?;
        let fragment_timeout = seconds("FRAGMENT_TIMEOUT_SECS", DEFAULT_FRAGMENT_TIMEOUT)?;

        let secret = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        let credentials = Credentials {
            speech: secret(SPEECH_KEY_NAME),
            generation: secret(GENERATION_KEY_NAME),
            synthesis: secret(SYNTHESIS_KEY_NAME),
            feed: secret(FEED_KEY_NAME),
            synthesis_required: synth_provider == SynthProvider::Murf,
        };

        Ok(Self {
            bind_address,
            credentials,
            synth_provider,
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            voice_id: lookup("MURF_VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            fallback_audio_path: lookup("FALLBACK_AUDIO_PATH")
                .unwrap_or_else(|| DEFAULT_FALLBACK_AUDIO_PATH.to_string())
                .into(),
            static_dir: lookup("STATIC_DIR")
                .unwrap_or_else(|| "static".to_string())
                .into(),
            persona_path: lookup("PERSONA_PATH").map(PathBuf::from),
            request_timeout,
            fragment_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_source(source(&[])).unwrap();
        assert_eq!(
            config.bind_address,
            "127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.synth_provider, SynthProvider::Murf);
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert_eq!(config.voice_id, "en-US-natalie");
        assert_eq!(config.fallback_audio_path, PathBuf::from("static/fallback.mp3"));
        assert!(config.persona_path.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.fragment_timeout, Duration::from_secs(20));
        // Missing keys do not stop the server from starting.
        assert!(config.credentials.validate().is_err());
    }

    #[test]
    fn keys_are_picked_up() {
        let config = Config::from_source(source(&[
            ("ASSEMBLYAI_API_KEY", "a"),
            ("GEMINI_API_KEY", "g"),
            ("MURF_API_KEY", "m"),
            ("NEWS_API_KEY", "n"),
        ]))
        .unwrap();
        assert!(config.credentials.validate().is_ok());
    }

    #[test]
    fn mock_synthesis_needs_no_key() {
        let config = Config::from_source(source(&[
            ("SYNTH_PROVIDER", "MOCK"),
            ("ASSEMBLYAI_API_KEY", "a"),
            ("GEMINI_API_KEY", "g"),
            ("NEWS_API_KEY", "n"),
        ]))
        .unwrap();
        assert_eq!(config.synth_provider, SynthProvider::Mock);
        assert!(config.credentials.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_source(source(&[("BIND_ADDRESS", "nowhere")])),
            Err(ConfigError::InvalidValue(var, _)) if var == "BIND_ADDRESS"
        ));
        assert!(matches!(
            Config::from_source(source(&[("SYNTH_PROVIDER", "espeak")])),
            Err(ConfigError::InvalidValue(var, _)) if var == "SYNTH_PROVIDER"
        ));
        assert!(matches!(
            Config::from_source(source(&[("FRAGMENT_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidValue(var, _)) if var == "FRAGMENT_TIMEOUT_SECS"
        ));
    }

    #[test]
    fn default_fallback_clip_ships_with_the_service() {
        let config = Config::from_source(source(&[])).unwrap();
        let workspace = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let clip = std::fs::read(workspace.join(&config.fallback_audio_path)).unwrap();
        // MPEG audio frame sync
        assert_eq!(&clip[..2], &[0xFF, 0xFB]);
    }

    #[test]
    fn provider_timeouts_are_configurable() {
        let config = Config::from_source(source(&[
            ("PROVIDER_TIMEOUT_SECS", "3"),
            ("FRAGMENT_TIMEOUT_SECS", " 7 "),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.fragment_timeout, Duration::from_secs(7));
    }
}
