use thiserror::Error;

/// Errors that can occur when using the llm-chat-stream library.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied something unusable, e.g. an empty conversation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The vendor call could not be started (bad config, auth, connection, API error).
    #[error("Provider unavailable: {provider} - {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A vendor stream broke after it started. Adapters log this and close
    /// the output channel; it never reaches the caller of a stream operation.
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Writing a frame to the outbound transport failed.
    #[error("Transport write failed: {0}")]
    TransportWrite(#[from] std::io::Error),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::provider("OpenAI", "connection refused");
        assert!(error.to_string().contains("OpenAI"));
        assert!(error.to_string().contains("connection refused"));

        let error = Error::invalid_argument("no messages provided");
        assert_eq!(error.to_string(), "Invalid argument: no messages provided");

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone");
        let error: Error = io.into();
        assert!(matches!(error, Error::TransportWrite(_)));
    }
}
