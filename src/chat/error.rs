use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unsupported provider: {0:?}")]
    UnknownProvider(String),

    #[error("invalid API URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("API key cannot be sent as an HTTP header")]
    InvalidCredential,

    #[error("failed to decode frame {line:?}: {source}")]
    FrameDecode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame exceeds {limit} bytes without a line break")]
    OversizedFrame { limit: usize },

    #[error("provider reported an error: {0}")]
    Remote(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),
}

impl ChatError {
    /// The request could not be built; nothing was sent.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ChatError::UnknownProvider(_)
                | ChatError::InvalidUrl { .. }
                | ChatError::Encode(_)
                | ChatError::InvalidCredential
        )
    }

    /// A single frame was unusable; the stream carries on.
    pub fn is_frame(&self) -> bool {
        matches!(
            self,
            ChatError::FrameDecode { .. } | ChatError::OversizedFrame { .. } | ChatError::Remote(_)
        )
    }

    /// The exchange itself broke down and the session is over.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChatError::Http(_) | ChatError::Status { .. } | ChatError::IdleTimeout(_)
        )
    }
}
