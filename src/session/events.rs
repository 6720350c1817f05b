use crate::capture::AudioFrame;
use tokio::sync::mpsc;

/// Identifies one scheduled chunk on the output device.
pub type PlaybackId = u64;

/// Signals raised by the remote conversational session.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSignal {
    Open,
    Message(LiveMessage),
    Error(String),
    /// The remote side ended the session, with its reason when it gave one.
    Close(Option<String>),
}

/// Transport-neutral view of one server message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMessage {
    /// Base64 PCM chunks, in the order they appeared.
    pub audio: Vec<String>,
    pub interrupted: bool,
    pub input_transcript: Option<String>,
    pub output_transcript: Option<String>,
    pub turn_complete: bool,
}

impl LiveMessage {
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            audio: vec![data.into()],
            ..Default::default()
        }
    }

    pub fn interruption() -> Self {
        Self {
            interrupted: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
            && !self.interrupted
            && !self.turn_complete
            && self.input_transcript.is_none()
            && self.output_transcript.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum SessionSignal {
    Capture(AudioFrame),
    Remote(RemoteSignal),
    PlaybackEnded(PlaybackId),
}

/// A signal tagged with the session attempt that produced it.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub epoch: u64,
    pub signal: SessionSignal,
}

/// Cloneable producer side of the session's event queue.
///
/// Devices and connectors each hold one; it is safe to use from audio
/// callback threads.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the session has gone away.
    pub fn send(&self, signal: SessionSignal) -> bool {
        self.tx
            .send(SessionEvent {
                epoch: self.epoch,
                signal,
            })
            .is_ok()
    }

    pub fn capture(&self, frame: AudioFrame) -> bool {
        self.send(SessionSignal::Capture(frame))
    }

    pub fn remote(&self, signal: RemoteSignal) -> bool {
        self.send(SessionSignal::Remote(signal))
    }

    pub fn playback_ended(&self, id: PlaybackId) -> bool {
        self.send(SessionSignal::PlaybackEnded(id))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
