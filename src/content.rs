//! Request/response content generation over the REST `generateContent`
//! endpoint, every call guarded by a [`ResilientInvoker`].

use crate::codec::{self, AudioBuffer};
use crate::config::{TutorConfig, model_path};
use crate::device::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE_HZ};
use crate::error::{Result, TutorError};
use crate::retry::ResilientInvoker;
use crate::types::{
    ApiErrorBody, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ResponseModality, SpeechConfig,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Voice used for word pronunciation.
pub const TTS_VOICE: &str = "Kore";

pub struct ContentClient {
    http: reqwest::Client,
    config: TutorConfig,
    invoker: ResilientInvoker,
}

impl ContentClient {
    pub fn new(config: TutorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TutorError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let invoker = ResilientInvoker::new(config.retry);
        Ok(Self {
            http,
            config,
            invoker,
        })
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    async fn post_generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path(model)
        );
        debug!("[Content] POST {}", url);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.to_string())
                .unwrap_or(body);
            warn!("[Content] {} returned {}: {}", model, status, message);
            return Err(TutorError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// First candidate's text from the content model.
    pub async fn generate_text(&self, request: GenerateContentRequest) -> Result<String> {
        let model = self.config.content_model.as_str();
        let request = &request;
        self.invoker
            .invoke(|| async move {
                let response = self.post_generate(model, request).await?;
                Ok(response.text())
            })
            .await
    }

    pub async fn generate_from_prompt(&self, prompt: impl Into<String>) -> Result<String> {
        self.generate_text(GenerateContentRequest::prompt(prompt)).await
    }

    /// Asks for `application/json` (optionally constrained by `schema`) and
    /// deserializes the reply as-is.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        mut request: GenerateContentRequest,
        schema: Option<serde_json::Value>,
    ) -> Result<T> {
        let config = request
            .generation_config
            .get_or_insert_with(GenerationConfig::default);
        config.response_mime_type = Some("application/json".to_string());
        if schema.is_some() {
            config.response_schema = schema;
        }

        let text = self.generate_text(request).await?;
        Ok(serde_json::from_str(strip_code_fence(&text))?)
    }

    /// Synthesizes `text` as 24kHz mono speech.
    pub async fn text_to_speech(&self, text: &str) -> Result<AudioBuffer> {
        let request = GenerateContentRequest {
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig::prebuilt(TTS_VOICE)),
                ..Default::default()
            }),
            ..GenerateContentRequest::prompt(format!("Say clearly: {}", text))
        };
        let model = self.config.tts_model.as_str();
        let request = &request;

        let data = self
            .invoker
            .invoke(|| async move {
                let response = self.post_generate(model, request).await?;
                Ok(response.inline_data().map(|blob| blob.data.clone()))
            })
            .await?;

        let bytes = codec::decode_from_transport(&data)?;
        let buffer = codec::to_channel_buffer(&bytes, OUTPUT_SAMPLE_RATE_HZ, OUTPUT_CHANNELS)?;
        info!(
            "[Content] Synthesized {:.2}s of speech for {:?}.",
            buffer.duration(),
            text
        );
        Ok(buffer)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
