//! Gemini Live WebSocket client: the concrete remote side of a
//! [`LiveAudioSession`](crate::session::LiveAudioSession).

pub mod builder;
pub mod handle;

mod connection;

pub use builder::LiveSetupBuilder;
pub use handle::GeminiLiveHandle;

use crate::config::TutorConfig;
use crate::error::Result;
use crate::profile::InstructionProfile;
use crate::session::{EventSink, LiveConnector};
use crate::types::{
    AudioTranscriptionConfig, Content, GenerationConfig, ResponseModality, SpeechConfig,
};

/// Payloads allowed in flight to the connection task before sends drop.
pub const OUTGOING_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    config: TutorConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: TutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    /// Audio responses in the profile's voice, its system instruction, and
    /// transcription of both directions.
    pub fn builder_for(&self, profile: &InstructionProfile) -> LiveSetupBuilder {
        LiveSetupBuilder::new(self.config.api_key.clone(), self.config.live_model_path())
            .endpoint(self.config.live_endpoint.clone())
            .handshake_timeout(self.config.connect_timeout)
            .generation_config(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig::prebuilt(profile.voice_name())),
                ..Default::default()
            })
            .system_instruction(Content::text(profile.system_instruction()))
            .input_audio_transcription(AudioTranscriptionConfig {})
            .output_audio_transcription(AudioTranscriptionConfig {})
    }
}

impl LiveConnector for GeminiLiveConnector {
    type Session = GeminiLiveHandle;

    async fn connect(
        &self,
        profile: &InstructionProfile,
        sink: EventSink,
    ) -> Result<GeminiLiveHandle> {
        self.builder_for(profile).connect(sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodedPacket;
    use crate::error::TutorError;
    use crate::profile::{Level, Personality, Scenario};
    use crate::session::{RemoteSession, RemoteSignal, SessionEvent, SessionSignal};
    use crate::test_utils::init_test_logger;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn setup_carries_voice_instruction_and_transcription() {
        let connector = GeminiLiveConnector::new(TutorConfig::new("k"));
        let profile = InstructionProfile::new(Personality::Caring, Level::Beginner, Scenario::Hotel);
        let setup = serde_json::to_value(connector.builder_for(&profile).setup()).unwrap();

        assert_eq!(
            setup["model"],
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(
            setup["systemInstruction"]["parts"][0]["text"],
            profile.system_instruction()
        );
        assert!(setup["inputAudioTranscription"].is_object());
        assert!(setup["outputAudioTranscription"].is_object());
    }

    async fn next_signal(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> RemoteSignal {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SessionEvent {
                signal: SessionSignal::Remote(signal),
                ..
            })) => signal,
            other => panic!("expected a remote signal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn talks_to_a_local_live_server() {
        init_test_logger();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let setup = ws.next().await.unwrap().unwrap();
            let setup: serde_json::Value = serde_json::from_str(setup.to_text().unwrap()).unwrap();
            assert!(setup["setup"]["model"].is_string());

            ws.send(Message::Binary(br#"{"setupComplete":{}}"#.to_vec().into()))
                .await
                .unwrap();

            let audio = ws.next().await.unwrap().unwrap();
            let audio: serde_json::Value = serde_json::from_str(audio.to_text().unwrap()).unwrap();
            assert_eq!(
                audio["realtimeInput"]["audio"]["mimeType"],
                "audio/pcm;rate=16000"
            );

            ws.send(Message::Text(
                r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}}]}}}"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let config = TutorConfig::new("test-key").with_live_endpoint(format!("ws://{}", addr));
        let connector = GeminiLiveConnector::new(config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);

        let mut handle = connector
            .connect(&InstructionProfile::default(), sink)
            .await
            .unwrap();
        assert_eq!(next_signal(&mut rx).await, RemoteSignal::Open);

        handle
            .send_audio(EncodedPacket::pcm16(&[0; 16], 16000))
            .unwrap();
        match next_signal(&mut rx).await {
            RemoteSignal::Message(message) => assert_eq!(message.audio, vec!["AAA=".to_string()]),
            other => panic!("expected audio message, got {:?}", other),
        }
        assert_eq!(next_signal(&mut rx).await, RemoteSignal::Close(None));

        RemoteSession::close(&mut handle);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        init_test_logger();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accepts the TCP connection and never answers the upgrade request.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let config = TutorConfig::new("test-key")
            .with_live_endpoint(format!("ws://{}", addr))
            .with_connect_timeout(Duration::from_millis(200));
        let connector = GeminiLiveConnector::new(config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = timeout(
            Duration::from_secs(5),
            connector.connect(&InstructionProfile::default(), EventSink::new(1, tx)),
        )
        .await
        .expect("connect must give up on its own");

        assert!(matches!(result, Err(TutorError::Transport(msg)) if msg.contains("timed out")));
        assert!(rx.try_recv().is_err());
        server.abort();
    }
}
