/// Configuration failures, detected before a session is allowed to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
}

/// Session-scoped failures. None of these ever take the process down.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("Upstream provider failure: {0}")]
    Upstream(String),
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl SessionError {
    /// Text for the single `error` event a client receives when a session
    /// cannot begin.
    pub fn client_message(&self) -> String {
        match self {
            Self::Configuration(ConfigError::MissingCredentials(missing))
                if missing.contains(&crate::config::SPEECH_KEY_NAME) =>
            {
                "Speech recognition service unavailable".to_string()
            }
            Self::Upstream(cause) => format!("Connection error: {cause}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_speech_key_reads_as_unavailable_service() {
        let err = SessionError::from(ConfigError::MissingCredentials(vec![
            "ASSEMBLYAI_API_KEY",
            "NEWS_API_KEY",
        ]));
        assert_eq!(err.client_message(), "Speech recognition service unavailable");
    }

    #[test]
    fn other_missing_keys_are_named() {
        let err = SessionError::from(ConfigError::MissingCredentials(vec!["NEWS_API_KEY"]));
        assert_eq!(err.client_message(), "Missing credentials: NEWS_API_KEY");
    }

    #[test]
    fn upstream_failures_read_as_connection_errors() {
        let err = SessionError::Upstream("refused".into());
        assert_eq!(err.client_message(), "Connection error: refused");
    }
}
