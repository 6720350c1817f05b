//! Microphone and speaker devices on top of `cpal`.
//!
//! Output is a small software mixer: every scheduled chunk becomes a voice
//! with an absolute start frame, and the device callback sums whatever
//! voices overlap the current block. The device clock is the number of
//! frames rendered so far.

use super::{AudioBackend, CaptureDevice, OutputDevice, INPUT_SAMPLE_RATE_HZ};
use crate::capture::{mix_to_mono, FrameAssembler, InputResampler};
use crate::codec::AudioBuffer;
use crate::error::{Result, TutorError};
use crate::session::{EventSink, PlaybackId};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SampleRate, SizedSample, StreamConfig, SupportedStreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

fn find_supported_config<F, I>(
    mut configs_iterator_fn: F,
    target_sample_rate: u32,
    target_channels: u16,
) -> Option<SupportedStreamConfig>
where
    F: FnMut() -> std::result::Result<I, cpal::SupportedStreamConfigsError>,
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    let mut best_config: Option<SupportedStreamConfig> = None;
    let mut best_score = u64::MAX;

    for config_range in configs_iterator_fn().ok()? {
        if !matches!(
            config_range.sample_format(),
            SampleFormat::F32 | SampleFormat::I16
        ) {
            continue;
        }
        let min_rate = config_range.min_sample_rate().0;
        let max_rate = config_range.max_sample_rate().0;
        let rate = target_sample_rate.clamp(min_rate, max_rate);
        let rate_diff = rate.abs_diff(target_sample_rate) as u64;
        let channel_penalty = if config_range.channels() == target_channels {
            0
        } else {
            1_000_000
        };
        let score = rate_diff + channel_penalty;
        if score < best_score {
            best_score = score;
            best_config = Some(config_range.with_sample_rate(SampleRate(rate)));
        }
        if score == 0 {
            break;
        }
    }
    best_config
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Default input and output devices of the platform's default host.
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl AudioBackend for CpalBackend {
    type Capture = CpalCapture;
    type Output = CpalOutput;

    fn open_capture(&self, sample_rate: u32, channels: u16, sink: EventSink) -> Result<CpalCapture> {
        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| TutorError::PermissionDenied("No input device available".into()))?;
        info!(
            "[AudioInput] Using input: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let supported = find_supported_config(|| device.supported_input_configs(), sample_rate, channels)
            .ok_or_else(|| TutorError::PermissionDenied("No usable input configuration".into()))?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        info!(
            "[AudioInput] Selected input: {} Hz, {} ch, {:?}",
            config.sample_rate.0, config.channels, format
        );

        let active = Arc::new(AtomicBool::new(false));
        let pipeline = CapturePipeline::new(config.sample_rate.0, config.channels, sink)?;
        let stream = match format {
            SampleFormat::I16 => build_input::<i16>(&device, &config, pipeline, active.clone()),
            _ => build_input::<f32>(&device, &config, pipeline, active.clone()),
        }
        .map_err(|e| TutorError::PermissionDenied(e.to_string()))?;

        Ok(CpalCapture {
            stream: Some(stream),
            active,
        })
    }

    fn open_output(&self, sample_rate: u32, channels: u16, sink: EventSink) -> Result<CpalOutput> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| TutorError::Device("No output device available".into()))?;
        info!(
            "[AudioOutput] Using output: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let supported = find_supported_config(|| device.supported_output_configs(), sample_rate, channels)
            .ok_or_else(|| TutorError::Device("No usable output configuration".into()))?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        info!(
            "[AudioOutput] Selected output: {} Hz, {} ch, {:?}",
            config.sample_rate.0, config.channels, format
        );

        let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0)));
        let stream = match format {
            SampleFormat::I16 => build_output::<i16>(&device, &config, mixer.clone(), sink),
            _ => build_output::<f32>(&device, &config, mixer.clone(), sink),
        }
        .map_err(|e| TutorError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| TutorError::Device(e.to_string()))?;

        Ok(CpalOutput {
            stream: Some(stream),
            mixer,
        })
    }
}

/// Device-rate input to 16kHz mono frames.
struct CapturePipeline {
    channels: u16,
    resampler: Option<InputResampler>,
    assembler: FrameAssembler,
    sink: EventSink,
}

impl CapturePipeline {
    fn new(device_rate: u32, channels: u16, sink: EventSink) -> Result<Self> {
        let resampler = if device_rate == INPUT_SAMPLE_RATE_HZ {
            None
        } else {
            Some(InputResampler::new(device_rate, channels)?)
        };
        Ok(Self {
            channels,
            resampler,
            assembler: FrameAssembler::default(),
            sink,
        })
    }

    fn push(&mut self, interleaved: &[f32]) {
        let mono = match self.resampler.as_mut() {
            Some(resampler) => match resampler.process(interleaved) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("[AudioInput] Resampling failed, dropping block: {}", e);
                    return;
                }
            },
            None => mix_to_mono(interleaved, self.channels),
        };
        for frame in self.assembler.push(&mono) {
            if !self.sink.capture(frame) {
                return;
            }
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut pipeline: CapturePipeline,
    active: Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !active.load(Ordering::Acquire) || data.is_empty() {
                return;
            }
            scratch.clear();
            scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
            pipeline.push(&scratch);
        },
        |err| error!("[AudioInput] CPAL Error: {}", err),
        None,
    )
}

pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    active: Arc<AtomicBool>,
}

impl CaptureDevice for CpalCapture {
    fn begin(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| TutorError::InvalidState("capture already stopped".into()))?;
        stream
            .play()
            .map_err(|e| TutorError::PermissionDenied(e.to_string()))?;
        self.active.store(true, Ordering::Release);
        info!("[AudioInput] Capture started.");
        Ok(())
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("[AudioInput] Pause on stop failed: {}", e);
            }
            info!("[AudioInput] Capture stopped.");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Voice {
    id: PlaybackId,
    buffer: Arc<AudioBuffer>,
    start_frame: u64,
    // Source samples advanced per device frame.
    step: f64,
}

impl Voice {
    fn sample_at(&self, device_frame: u64) -> Option<f32> {
        let source = self.buffer.channel(0)?;
        let position = (device_frame - self.start_frame) as f64 * self.step;
        let index = position as usize;
        let current = *source.get(index)?;
        let next = source.get(index + 1).copied().unwrap_or(current);
        let fraction = (position - index as f64) as f32;
        Some(current + (next - current) * fraction)
    }
}

struct Mixer {
    device_rate: u32,
    frames_played: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            frames_played: 0,
            voices: Vec::new(),
        }
    }

    fn current_time(&self) -> f64 {
        self.frames_played as f64 / self.device_rate as f64
    }

    fn add(&mut self, id: PlaybackId, buffer: Arc<AudioBuffer>, start_at: f64) {
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        let step = buffer.sample_rate() as f64 / self.device_rate as f64;
        self.voices.push(Voice {
            id,
            buffer,
            start_frame,
            step,
        });
    }

    /// Renders `frames` mono frames and returns the ids of voices that ran out.
    fn render(&mut self, out: &mut Vec<f32>, frames: usize) -> Vec<PlaybackId> {
        out.clear();
        out.resize(frames, 0.0);
        let mut finished = Vec::new();

        for voice in &self.voices {
            let mut done = false;
            for (i, slot) in out.iter_mut().enumerate() {
                let frame = self.frames_played + i as u64;
                if frame < voice.start_frame {
                    continue;
                }
                match voice.sample_at(frame) {
                    Some(sample) => *slot += sample,
                    None => {
                        done = true;
                        break;
                    }
                }
            }
            if done {
                finished.push(voice.id);
            }
        }

        self.voices.retain(|v| !finished.contains(&v.id));
        self.frames_played += frames as u64;
        finished
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    sink: EventSink,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            let finished = lock(&mixer).render(&mut mono, frames);
            for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                let value = T::from_sample(sample.clamp(-1.0, 1.0));
                frame.fill(value);
            }
            for id in finished {
                sink.playback_ended(id);
            }
        },
        |err| error!("[AudioOutput] CPAL Error: {}", err),
        None,
    )
}

pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        lock(&self.mixer).current_time()
    }

    fn play_at(&mut self, id: PlaybackId, buffer: Arc<AudioBuffer>, start_at: f64) -> Result<()> {
        if self.stream.is_none() {
            return Err(TutorError::NotReady);
        }
        lock(&self.mixer).add(id, buffer, start_at);
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        lock(&self.mixer).voices.retain(|v| v.id != id);
    }

    fn close(&mut self) {
        lock(&self.mixer).voices.clear();
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("[AudioOutput] Pause on close failed: {}", e);
            }
            info!("[AudioOutput] Output closed.");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, rate: u32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(
            rate,
            vec![(0..frames).map(|i| i as f32 / frames as f32).collect()],
        ))
    }

    #[test]
    fn voices_start_on_their_frame_and_report_completion() {
        let mut mixer = Mixer::new(24000);
        mixer.add(1, ramp(4, 24000), 2.0 / 24000.0);
        let mut out = Vec::new();

        let finished = mixer.render(&mut out, 4);
        assert!(finished.is_empty());
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.25]);

        let finished = mixer.render(&mut out, 4);
        assert_eq!(out, vec![0.5, 0.75, 0.0, 0.0]);
        assert_eq!(finished, vec![1]);
        assert!((mixer.current_time() - 8.0 / 24000.0).abs() < 1e-12);
    }

    #[test]
    fn faster_device_interpolates() {
        let mut mixer = Mixer::new(48000);
        mixer.add(7, ramp(2, 24000), 0.0);
        let mut out = Vec::new();

        let finished = mixer.render(&mut out, 5);
        assert_eq!(&out[..4], &[0.0, 0.25, 0.5, 0.5]);
        assert_eq!(finished, vec![7]);
    }
}
