//! Conversions between PCM sample buffers, their base64 transport form, and
//! planar floating-point buffers ready for playback.

use crate::error::{Result, TutorError};
use base64::Engine as _;

/// Divisor mapping a signed 16-bit sample onto `[-1.0, 1.0)`.
const PCM16_SCALE: f32 = i16::MAX as f32 + 1.0;

/// Decoded audio held as one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Base64 audio plus the MIME tag announcing its sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: String,
    pub mime_type: String,
}

impl EncodedPacket {
    pub fn pcm16(samples: &[i16], sample_rate: u32) -> Self {
        Self {
            data: encode_for_transport(samples),
            mime_type: pcm_mime_type(sample_rate),
        }
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Packs samples as little-endian bytes and base64-encodes them.
pub fn encode_for_transport(samples: &[i16]) -> String {
    let mut byte_data = Vec::with_capacity(samples.len() * 2);
    for sample_val in samples {
        byte_data.extend_from_slice(&sample_val.to_le_bytes());
    }
    encode_bytes(&byte_data)
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_from_transport(text: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Reinterprets `bytes` as interleaved little-endian int16 samples and splits
/// them into `channel_count` normalized planar channels.
pub fn to_channel_buffer(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<AudioBuffer> {
    let frame_bytes = channel_count as usize * 2;
    if frame_bytes == 0 || bytes.len() % frame_bytes != 0 {
        return Err(TutorError::InvalidBufferLength {
            len: bytes.len(),
            channels: channel_count,
        });
    }

    let frames = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frames); channel_count as usize];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(2)) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(value as f32 / PCM16_SCALE);
        }
    }
    Ok(AudioBuffer::new(sample_rate, channels))
}

/// Capture-side conversion of float samples to int16, clamping out-of-range input.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * PCM16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}
