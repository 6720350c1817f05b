//! Local audio device seams. The session talks to microphones and speakers
//! only through these traits.

use crate::codec::AudioBuffer;
use crate::error::Result;
use crate::session::{EventSink, PlaybackId};
use std::sync::Arc;

#[cfg(feature = "cpal-devices")]
pub mod cpal_backend;

#[cfg(feature = "cpal-devices")]
pub use cpal_backend::CpalBackend;

/// Sample rate (16kHz) of audio sent to the remote session.
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16000;
/// Number of channels (mono) of audio sent to the remote session.
pub const INPUT_CHANNELS: u16 = 1;
/// Sample rate (24kHz) of synthesized speech received from the remote session.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 24000;
/// Number of channels (mono) of synthesized speech.
pub const OUTPUT_CHANNELS: u16 = 1;

/// Microphone handle. Frames go to the [`EventSink`] it was opened with.
pub trait CaptureDevice {
    /// Starts delivering frames. Frames captured before this are discarded.
    fn begin(&mut self) -> Result<()>;
    /// Stops delivery and releases the device. Calling it twice is harmless.
    fn stop(&mut self);
}

/// Speaker handle with a monotonic clock in seconds.
pub trait OutputDevice {
    fn current_time(&self) -> f64;
    /// Plays `buffer` starting at absolute device time `start_at`. Natural
    /// completion is reported through the sink as `PlaybackEnded(id)`.
    fn play_at(&mut self, id: PlaybackId, buffer: Arc<AudioBuffer>, start_at: f64) -> Result<()>;
    /// Cuts a scheduled or playing chunk short. No ended signal follows.
    fn stop(&mut self, id: PlaybackId);
    fn close(&mut self);
}

/// Factory for the device pair a session needs.
pub trait AudioBackend {
    type Capture: CaptureDevice;
    type Output: OutputDevice;

    /// Fails with `PermissionDenied` when the microphone cannot be acquired.
    fn open_capture(
        &self,
        sample_rate: u32,
        channels: u16,
        sink: EventSink,
    ) -> Result<Self::Capture>;

    fn open_output(&self, sample_rate: u32, channels: u16, sink: EventSink)
    -> Result<Self::Output>;
}
