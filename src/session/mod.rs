//! The live spoken-dialogue session: microphone frames go out, synthesized
//! speech comes back and is scheduled gaplessly, transcripts accumulate.
//!
//! Everything the session reacts to arrives on one event queue and is
//! applied from the task that owns the session, so playback state needs no
//! locking.

mod events;
mod remote;

pub use events::{
    EventSink, LiveMessage, PlaybackId, RemoteSignal, SessionEvent, SessionSignal,
};
pub use remote::{LiveConnector, RemoteSession};

use crate::capture::AudioFrame;
use crate::codec::{self, EncodedPacket};
use crate::device::{
    AudioBackend, CaptureDevice, INPUT_CHANNELS, INPUT_SAMPLE_RATE_HZ, OUTPUT_CHANNELS,
    OUTPUT_SAMPLE_RATE_HZ,
};
use crate::error::{Result, TutorError};
use crate::playback::PlaybackScheduler;
use crate::profile::InstructionProfile;
use crate::transcript::{Speaker, TranscriptEntry, TranscriptWindow};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

pub const CONNECTION_ERROR_MESSAGE: &str =
    "AI connection error. Please try again in a few seconds.";
pub const START_FAILED_MESSAGE: &str =
    "Could not start: network or API key error. Please check and try again.";
pub const PERMISSION_DENIED_MESSAGE: &str =
    "Microphone access was denied. Allow microphone access and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Errored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub chunks_scheduled: u64,
    pub chunks_discarded: u64,
    pub interruptions: u64,
}

pub struct LiveAudioSession<B: AudioBackend, C: LiveConnector> {
    backend: B,
    connector: C,
    state: SessionState,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    capture: Option<B::Capture>,
    playback: Option<PlaybackScheduler<B::Output>>,
    remote: Option<C::Session>,
    transcript: TranscriptWindow,
    last_error: Option<String>,
    stats: SessionStats,
}

impl<B: AudioBackend, C: LiveConnector> LiveAudioSession<B, C> {
    pub fn new(backend: B, connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            connector,
            state: SessionState::Idle,
            epoch: 0,
            events_tx,
            events_rx,
            capture: None,
            playback: None,
            remote: None,
            transcript: TranscriptWindow::default(),
            last_error: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.to_vec()
    }

    /// User-facing description of the last failure, cleared on `start`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn playback(&self) -> Option<&PlaybackScheduler<B::Output>> {
        self.playback.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// A sink bound to the current attempt, for feeding events from outside.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(self.epoch, self.events_tx.clone())
    }

    /// Tears down whatever ran before, acquires both audio devices and opens
    /// the remote session. The session stays `Connecting` until the remote
    /// side signals open.
    pub async fn start(&mut self, profile: &InstructionProfile) -> Result<()> {
        self.teardown();
        self.epoch += 1;
        self.transcript.clear();
        self.last_error = None;
        self.stats = SessionStats::default();
        self.state = SessionState::Connecting;
        info!(
            "[LiveSession] Starting attempt #{} ({}, {}).",
            self.epoch,
            profile.personality,
            profile.scenario.id()
        );

        let sink = self.event_sink();
        match self.acquire(profile, sink).await {
            Ok(()) => {
                debug!("[LiveSession] Resources acquired, waiting for open signal.");
                Ok(())
            }
            Err(e) => {
                error!("[LiveSession] Start failed: {}", e);
                let message = match &e {
                    TutorError::PermissionDenied(_) => PERMISSION_DENIED_MESSAGE.to_string(),
                    TutorError::QuotaExceeded(text) => text.clone(),
                    _ => START_FAILED_MESSAGE.to_string(),
                };
                self.fail(message);
                Err(e)
            }
        }
    }

    async fn acquire(&mut self, profile: &InstructionProfile, sink: EventSink) -> Result<()> {
        let output = self
            .backend
            .open_output(OUTPUT_SAMPLE_RATE_HZ, OUTPUT_CHANNELS, sink.clone())?;
        self.playback = Some(PlaybackScheduler::new(output));

        let capture = self
            .backend
            .open_capture(INPUT_SAMPLE_RATE_HZ, INPUT_CHANNELS, sink.clone())
            .map_err(|e| match e {
                TutorError::PermissionDenied(_) => e,
                other => TutorError::PermissionDenied(other.to_string()),
            })?;
        self.capture = Some(capture);

        let remote = self.connector.connect(profile, sink).await?;
        self.remote = Some(remote);
        Ok(())
    }

    /// Immediate stop from any state; ends in `Idle`.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            self.teardown();
            return;
        }
        info!("[LiveSession] Stop requested in {:?}.", self.state);
        self.state = SessionState::Closing;
        self.teardown();
        self.state = SessionState::Idle;
    }

    /// Waits for the next event and applies it. Returns `false` if it was
    /// ignored.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    /// Applies every event already queued without waiting. Returns how many
    /// were applied.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Drives the session until it settles in `Idle` or `Errored`.
    pub async fn run(&mut self) -> SessionState {
        while matches!(
            self.state,
            SessionState::Connecting | SessionState::Active | SessionState::Closing
        ) {
            self.process_next().await;
        }
        self.state
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        if event.epoch != self.epoch {
            trace!(
                "[LiveSession] Ignoring event from attempt #{} (current #{}).",
                event.epoch, self.epoch
            );
            return false;
        }
        match event.signal {
            SessionSignal::Capture(frame) => self.on_capture(frame),
            SessionSignal::PlaybackEnded(id) => self
                .playback
                .as_mut()
                .is_some_and(|playback| playback.on_ended(id)),
            SessionSignal::Remote(RemoteSignal::Open) => self.on_open(),
            SessionSignal::Remote(RemoteSignal::Message(message)) => self.on_message(message),
            SessionSignal::Remote(RemoteSignal::Error(reason)) => self.on_remote_error(reason),
            SessionSignal::Remote(RemoteSignal::Close(reason)) => self.on_remote_close(reason),
        }
    }

    fn on_open(&mut self) -> bool {
        if self.state != SessionState::Connecting {
            debug!("[LiveSession] Open signal in {:?}, ignoring.", self.state);
            return false;
        }
        self.state = SessionState::Active;
        if let Some(capture) = self.capture.as_mut() {
            if let Err(e) = capture.begin() {
                error!("[LiveSession] Capture failed to start: {}", e);
                self.fail(PERMISSION_DENIED_MESSAGE.to_string());
                return true;
            }
        }
        info!("[LiveSession] Remote session open, capture running.");
        true
    }

    fn on_capture(&mut self, frame: AudioFrame) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        let samples = codec::float_to_pcm16(frame.samples());
        let packet = EncodedPacket::pcm16(&samples, INPUT_SAMPLE_RATE_HZ);
        let sent = match self.remote.as_ref() {
            Some(remote) => remote.send_audio(packet),
            None => Err(TutorError::DroppedFrame),
        };
        match sent {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => {
                self.stats.frames_dropped += 1;
                trace!("[LiveSession] Dropped capture frame: {}", e);
            }
        }
        true
    }

    fn on_message(&mut self, message: LiveMessage) -> bool {
        if self.state != SessionState::Active {
            debug!("[LiveSession] Message in {:?}, ignoring.", self.state);
            return false;
        }

        for data in &message.audio {
            let decoded = codec::decode_from_transport(data).and_then(|bytes| {
                codec::to_channel_buffer(&bytes, OUTPUT_SAMPLE_RATE_HZ, OUTPUT_CHANNELS)
            });
            let scheduled = decoded.and_then(|chunk| match self.playback.as_mut() {
                Some(playback) => playback.schedule(chunk),
                None => Err(TutorError::NotReady),
            });
            match scheduled {
                Ok(_) => self.stats.chunks_scheduled += 1,
                Err(e) => {
                    self.stats.chunks_discarded += 1;
                    warn!("[LiveSession] Discarding audio chunk: {}", e);
                }
            }
        }

        if message.interrupted {
            let cut = self
                .playback
                .as_mut()
                .map_or(0, |playback| playback.interrupt());
            self.stats.interruptions += 1;
            debug!("[LiveSession] Barge-in, {} chunk(s) cut.", cut);
        }

        if let Some(text) = message.output_transcript.filter(|t| !t.is_empty()) {
            self.transcript.push(Speaker::Tutor, text);
        }
        if let Some(text) = message.input_transcript.filter(|t| !t.is_empty()) {
            self.transcript.push(Speaker::Learner, text);
        }
        true
    }

    fn on_remote_error(&mut self, reason: String) -> bool {
        if !matches!(self.state, SessionState::Connecting | SessionState::Active) {
            return false;
        }
        error!("[LiveSession] Remote session error: {}", reason);
        self.fail(CONNECTION_ERROR_MESSAGE.to_string());
        true
    }

    /// A close before the setup was acknowledged means the remote side
    /// refused the session (bad key, unknown model) and is reported as a
    /// failed start. Once active it is a normal end of the conversation.
    fn on_remote_close(&mut self, reason: Option<String>) -> bool {
        let reason = reason.as_deref().unwrap_or("no reason given");
        match self.state {
            SessionState::Connecting => {
                error!("[LiveSession] Remote closed before setup completed: {}", reason);
                self.fail(START_FAILED_MESSAGE.to_string());
                true
            }
            SessionState::Active => {
                info!("[LiveSession] Remote session closed: {}", reason);
                self.stop();
                true
            }
            _ => false,
        }
    }

    fn fail(&mut self, message: String) {
        self.last_error = Some(message);
        self.state = SessionState::Errored;
        self.teardown();
    }

    /// Releases capture, playback and the remote session. Each is released
    /// at most once; missing pieces are skipped.
    fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            debug!("[LiveSession] Capture released.");
        }
        if let Some(mut playback) = self.playback.take() {
            playback.teardown();
        }
        if let Some(mut remote) = self.remote.take() {
            remote.close();
            debug!("[LiveSession] Remote session closed.");
        }
    }
}

impl<B: AudioBackend, C: LiveConnector> Drop for LiveAudioSession<B, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
