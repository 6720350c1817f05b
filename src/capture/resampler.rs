use super::mix_to_mono;
use crate::device::{INPUT_CHANNELS, INPUT_SAMPLE_RATE_HZ};
use crate::error::{Result, TutorError};
use audioadapter::direct::SequentialSliceOfVecs;
use rubato::{Fft, FixedSync, Resampler};
use tracing::{info, trace};

const RESAMPLER_CHUNK_FRAMES: usize = 1024;
const RESAMPLER_SUB_CHUNKS: usize = 2;

/// Converts microphone audio in whatever format the device delivers into the
/// 16kHz mono stream the remote session expects.
///
/// Interleaved input is mixed down to mono, buffered, and pushed through a
/// `rubato::Fft` resampler in fixed-size blocks. A trailing partial block
/// waits for the next callback.
pub struct InputResampler {
    resampler: Fft<f32>,
    input_channels: u16,
    mono_buffer: Vec<f32>,
    // Pre-allocated buffer for the resampler's mono output.
    output_buffer: Vec<Vec<f32>>,
}

impl InputResampler {
    pub fn new(input_rate: u32, input_channels: u16) -> Result<Self> {
        if input_rate == 0 || input_channels == 0 {
            return Err(TutorError::AudioResamplingError(format!(
                "Unsupported capture format {}Hz {}ch",
                input_rate, input_channels
            )));
        }
        info!(
            "[CaptureResampler] Initializing for input: {}Hz {}ch -> {}Hz {}ch.",
            input_rate, input_channels, INPUT_SAMPLE_RATE_HZ, INPUT_CHANNELS
        );

        let resampler = Fft::<f32>::new(
            input_rate as usize,
            INPUT_SAMPLE_RATE_HZ as usize,
            RESAMPLER_CHUNK_FRAMES,
            RESAMPLER_SUB_CHUNKS,
            INPUT_CHANNELS as usize,
            FixedSync::Input,
        )
        .map_err(|e| {
            TutorError::AudioResamplingError(format!("Failed to create Fft resampler: {}", e))
        })?;

        let max_output_frames = resampler.output_frames_max();
        Ok(Self {
            resampler,
            input_channels,
            mono_buffer: Vec::with_capacity(RESAMPLER_CHUNK_FRAMES * 2),
            output_buffer: vec![vec![0.0f32; max_output_frames.max(1)]; INPUT_CHANNELS as usize],
        })
    }

    pub fn buffered(&self) -> usize {
        self.mono_buffer.len()
    }

    /// Feeds interleaved samples in the capture format and returns whatever
    /// 16kHz mono output the completed blocks produced.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if interleaved.is_empty() {
            return Ok(Vec::new());
        }
        let mono = mix_to_mono(interleaved, self.input_channels);
        self.mono_buffer.extend(mono);
        trace!(
            "[CaptureResampler] Buffered {} mono samples.",
            self.mono_buffer.len()
        );

        let mut produced = Vec::new();
        loop {
            let required_input_frames = self.resampler.input_frames_next();
            if required_input_frames == 0 || self.mono_buffer.len() < required_input_frames {
                break;
            }
            let block: Vec<f32> = self.mono_buffer.drain(..required_input_frames).collect();
            self.run_block(vec![block], &mut produced)?;
        }
        Ok(produced)
    }

    fn run_block(&mut self, input: Vec<Vec<f32>>, produced: &mut Vec<f32>) -> Result<()> {
        let input_frames = input.first().map_or(0, Vec::len);
        let input_adapter =
            SequentialSliceOfVecs::new(&input, INPUT_CHANNELS as usize, input_frames).map_err(
                |e| TutorError::AudioResamplingError(format!("Input adapter error: {}", e)),
            )?;

        let output_frames_next = self.resampler.output_frames_next().max(1);
        self.output_buffer[0].resize(output_frames_next, 0.0);
        let mut output_adapter = SequentialSliceOfVecs::new_mut(
            &mut self.output_buffer,
            INPUT_CHANNELS as usize,
            output_frames_next,
        )
        .map_err(|e| TutorError::AudioResamplingError(format!("Output adapter error: {}", e)))?;

        let (_frames_read, frames_written) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| TutorError::AudioResamplingError(e.to_string()))?;

        produced.extend_from_slice(&self.output_buffer[0][..frames_written]);
        Ok(())
    }
}
