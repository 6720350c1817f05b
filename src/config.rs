use crate::error::{Result, TutorError};
use crate::retry::RetryPolicy;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_CONTENT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Bound on the live WebSocket handshake plus the setup write.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct TutorConfig {
    pub api_key: String,
    pub live_model: String,
    pub content_model: String,
    pub tts_model: String,
    pub api_base: String,
    pub live_endpoint: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl TutorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            content_model: DEFAULT_CONTENT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            live_endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Reads `.env` (if present) and then the process environment.
    ///
    /// `GEMINI_API_KEY` is required. `GEMINI_LIVE_MODEL`, `GEMINI_CONTENT_MODEL`,
    /// `GEMINI_TTS_MODEL`, `TUTOR_RETRY_COUNT`, `TUTOR_RETRY_DELAY_MS` and
    /// `TUTOR_CONNECT_TIMEOUT_MS` override the defaults.
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_ok() {
            debug!("[Config] Loaded variables from .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TutorError::Config("GEMINI_API_KEY is not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Some(model) = lookup("GEMINI_LIVE_MODEL") {
            config.live_model = model;
        }
        if let Some(model) = lookup("GEMINI_CONTENT_MODEL") {
            config.content_model = model;
        }
        if let Some(model) = lookup("GEMINI_TTS_MODEL") {
            config.tts_model = model;
        }
        if let Some(raw) = lookup("TUTOR_RETRY_COUNT") {
            config.retry.retries = raw.trim().parse().map_err(|_| {
                TutorError::Config(format!("TUTOR_RETRY_COUNT is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = lookup("TUTOR_RETRY_DELAY_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                TutorError::Config(format!("TUTOR_RETRY_DELAY_MS is not a number: {}", raw))
            })?;
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("TUTOR_CONNECT_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                TutorError::Config(format!("TUTOR_CONNECT_TIMEOUT_MS is not a number: {}", raw))
            })?;
            config.connect_timeout = Duration::from_millis(ms);
        }

        info!(
            "[Config] live model {}, content model {}, {} retries starting at {:?}",
            config.live_model, config.content_model, config.retry.retries, config.retry.initial_delay
        );
        Ok(config)
    }

    pub fn with_live_model(mut self, model: impl Into<String>) -> Self {
        self.live_model = model.into();
        self
    }

    pub fn with_content_model(mut self, model: impl Into<String>) -> Self {
        self.content_model = model.into();
        self
    }

    pub fn with_tts_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_live_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.live_endpoint = endpoint.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Fully qualified `models/...` name for the live setup message.
    pub fn live_model_path(&self) -> String {
        model_path(&self.live_model)
    }
}

pub(crate) fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}
