//! Live spoken-dialogue pipeline for an English tutor built on Gemini.
//!
//! A [`LiveAudioSession`] streams microphone frames to a Gemini Live session,
//! schedules the synthesized replies for gapless playback, cuts playback
//! when the learner barges in, and keeps a short transcript. One-shot
//! content generation (text, JSON, text-to-speech) goes through
//! [`ContentClient`], whose calls are retried by a [`ResilientInvoker`].

pub mod cache;
pub mod capture;
pub mod client;
pub mod codec;
pub mod config;
pub mod content;
pub mod device;
pub mod error;
pub mod playback;
pub mod profile;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod types;

pub use cache::SpeechCache;
pub use capture::{AudioFrame, FrameAssembler};
pub use client::{GeminiLiveConnector, GeminiLiveHandle, LiveSetupBuilder};
pub use codec::{AudioBuffer, EncodedPacket};
pub use config::TutorConfig;
pub use content::ContentClient;
pub use device::{AudioBackend, CaptureDevice, OutputDevice};
pub use error::{Result, TutorError};
pub use playback::{PlaybackHandle, PlaybackScheduler, SessionClock};
pub use profile::{InstructionProfile, Level, Personality, Scenario};
pub use retry::{ResilientInvoker, RetryPolicy};
pub use session::{LiveAudioSession, SessionState, SessionStats};
pub use transcript::{Speaker, TranscriptEntry};

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Once;
    use tracing::Level;
    use tracing_subscriber::EnvFilter;

    pub(crate) fn init_test_logger() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::builder()
                        .with_default_directive(Level::INFO.into())
                        .from_env_lossy(),
                )
                .with_test_writer()
                .try_init();
        });
    }
}
