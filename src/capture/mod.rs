//! Turning raw microphone callbacks into fixed-size frames for transmission.

#[cfg(feature = "audio-resampling")]
pub(crate) mod resampler;

#[cfg(feature = "audio-resampling")]
pub use resampler::InputResampler;

/// Samples per frame delivered on each capture tick.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// One capture tick of 16kHz mono float samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn silent() -> Self {
        Self::new(vec![0.0; CAPTURE_FRAME_SAMPLES])
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates arbitrarily sized mono blocks and cuts them into frames of
/// exactly `frame_size` samples, preserving order.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(CAPTURE_FRAME_SAMPLES)
    }
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_size;
        if complete == 0 {
            return Vec::new();
        }
        let ready: Vec<f32> = self.pending.drain(..complete * self.frame_size).collect();
        ready
            .chunks_exact(self.frame_size)
            .map(|chunk| AudioFrame::new(chunk.to_vec()))
            .collect()
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Averages interleaved channels down to mono.
pub fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
