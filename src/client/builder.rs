use super::connection::LiveSocket;
use super::handle::GeminiLiveHandle;
use super::OUTGOING_QUEUE_CAPACITY;
use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVE_ENDPOINT};
use crate::error::{Result, TutorError};
use crate::session::EventSink;
use crate::types::*;
use futures_util::SinkExt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};
use url::Url;

/// Collects the setup message for one live session and opens it.
pub struct LiveSetupBuilder {
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) initial_setup: BidiGenerateContentSetup,
    pub(crate) outgoing_capacity: usize,
    pub(crate) handshake_timeout: Duration,
}

impl LiveSetupBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            initial_setup: BidiGenerateContentSetup {
                model: model.into(),
                ..Default::default()
            },
            outgoing_capacity: OUTGOING_QUEUE_CAPACITY,
            handshake_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.initial_setup.generation_config = Some(config);
        self
    }

    pub fn system_instruction(mut self, instruction: Content) -> Self {
        self.initial_setup.system_instruction = Some(instruction);
        self
    }

    pub fn input_audio_transcription(mut self, config: AudioTranscriptionConfig) -> Self {
        self.initial_setup.input_audio_transcription = Some(config);
        self
    }

    pub fn output_audio_transcription(mut self, config: AudioTranscriptionConfig) -> Self {
        self.initial_setup.output_audio_transcription = Some(config);
        self
    }

    /// Outgoing frames beyond this many in flight are dropped, not queued.
    pub fn outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity.max(1);
        self
    }

    /// Upper bound on the WebSocket handshake plus the setup write.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn setup(&self) -> &BidiGenerateContentSetup {
        &self.initial_setup
    }

    fn url(&self) -> Result<Url> {
        Ok(Url::parse_with_params(
            &self.endpoint,
            &[("key", self.api_key.as_str())],
        )?)
    }

    /// Completes the WebSocket handshake and writes the setup message. The
    /// open signal follows on `sink` once the server acknowledges the setup.
    /// A peer that stalls past the handshake timeout yields `Transport`.
    pub async fn connect(self, sink: EventSink) -> Result<GeminiLiveHandle> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let url = self.url()?;
        info!(
            "[LiveConnection] Connecting to {} for {}.",
            url.host_str().unwrap_or("<unknown host>"),
            self.initial_setup.model
        );
        let setup_json =
            serde_json::to_string(&ClientMessagePayload::Setup(self.initial_setup))?;

        let ws_stream =
            match tokio::time::timeout(self.handshake_timeout, open_socket(&url, setup_json)).await
            {
                Ok(opened) => opened?,
                Err(_) => {
                    error!(
                        "[LiveConnection] Handshake not finished after {:?}, giving up.",
                        self.handshake_timeout
                    );
                    return Err(TutorError::Transport(format!(
                        "Live handshake timed out after {:?}",
                        self.handshake_timeout
                    )));
                }
            };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (outgoing_sender, outgoing_receiver) = mpsc::channel(self.outgoing_capacity);

        super::connection::spawn_processing_task(ws_stream, sink, shutdown_rx, outgoing_receiver);

        Ok(GeminiLiveHandle::new(shutdown_tx, outgoing_sender))
    }
}

async fn open_socket(url: &Url, setup_json: String) -> Result<LiveSocket> {
    let (mut ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    debug!("[LiveConnection] Sending setup: {}", setup_json);
    ws_stream
        .send(Message::Text(setup_json.into()))
        .await
        .map_err(|e| TutorError::Transport(format!("Failed to send setup message: {}", e)))?;
    Ok(ws_stream)
}
