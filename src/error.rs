use thiserror::Error;

/// Text surfaced verbatim to the learner when the service reports quota exhaustion.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "API_QUOTA_EXCEEDED: Your Gemini API quota has been exceeded. Please check your usage limits and billing status externally.";

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Empty response from AI")]
    EmptyResponse,

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio frame dropped")]
    DroppedFrame,

    #[error("PCM buffer of {len} bytes is not a multiple of {channels} channel(s) * 2 bytes")]
    InvalidBufferLength { len: usize, channels: u16 },

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio resampling error: {0}")]
    AudioResamplingError(String),

    #[error("Server reported an error: {0}")]
    ApiError(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Remote session is not ready")]
    NotReady,

    #[error("Failed to hand message to the connection task")]
    SendError,
}

pub type Result<T> = std::result::Result<T, TutorError>;

impl TutorError {
    pub fn quota_exceeded() -> Self {
        TutorError::QuotaExceeded(QUOTA_EXCEEDED_MESSAGE.to_string())
    }
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TutorError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => TutorError::ApiError(err.to_string()),
            None => TutorError::Transport(err.to_string()),
        }
    }
}
