//! Gapless scheduling of decoded speech chunks with immediate cancellation.

use crate::codec::AudioBuffer;
use crate::device::OutputDevice;
use crate::error::{Result, TutorError};
use crate::session::PlaybackId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// The "next start" cursor on the output device's timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionClock {
    next_start_time: f64,
}

impl SessionClock {
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Where a chunk should start given the device's current time.
    ///
    /// Taking the max keeps chunks back-to-back while playback keeps up and
    /// snaps forward to real time once the device has overtaken the schedule.
    pub fn start_for(&self, device_time: f64) -> f64 {
        self.next_start_time.max(device_time)
    }

    pub fn advance_to(&mut self, time: f64) {
        if time > self.next_start_time {
            self.next_start_time = time;
        }
    }

    pub fn reset(&mut self) {
        self.next_start_time = 0.0;
    }
}

/// One chunk the scheduler has handed to the device and not yet seen finish.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    pub id: PlaybackId,
    pub buffer: Arc<AudioBuffer>,
    pub start_at: f64,
    pub duration: f64,
}

impl PlaybackHandle {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

pub struct PlaybackScheduler<O: OutputDevice> {
    device: Option<O>,
    clock: SessionClock,
    active: BTreeMap<PlaybackId, PlaybackHandle>,
    next_id: PlaybackId,
}

impl<O: OutputDevice> PlaybackScheduler<O> {
    pub fn new(device: O) -> Self {
        Self {
            device: Some(device),
            clock: SessionClock::default(),
            active: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Queues `chunk` directly after the previously scheduled one.
    pub fn schedule(&mut self, chunk: AudioBuffer) -> Result<PlaybackId> {
        let device = self.device.as_mut().ok_or(TutorError::NotReady)?;

        let duration = chunk.duration();
        let start_at = self.clock.start_for(device.current_time());
        let id = self.next_id;
        let buffer = Arc::new(chunk);

        device.play_at(id, buffer.clone(), start_at)?;
        self.next_id += 1;
        self.clock.advance_to(start_at + duration);
        trace!(
            "[Playback] Scheduled #{} at {:.3}s for {:.3}s (next start {:.3}s)",
            id,
            start_at,
            duration,
            self.clock.next_start_time()
        );
        self.active.insert(
            id,
            PlaybackHandle {
                id,
                buffer,
                start_at,
                duration,
            },
        );
        Ok(id)
    }

    /// Natural completion reported by the device.
    pub fn on_ended(&mut self, id: PlaybackId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stops everything still queued or playing and rewinds the clock to zero.
    /// Returns how many chunks were cut.
    pub fn interrupt(&mut self) -> usize {
        let cut = self.active.len();
        if let Some(device) = self.device.as_mut() {
            for id in self.active.keys() {
                device.stop(*id);
            }
        }
        self.active.clear();
        self.clock.reset();
        if cut > 0 {
            debug!("[Playback] Interrupted {} pending chunk(s).", cut);
        }
        cut
    }

    /// `interrupt` plus releasing the output device.
    pub fn teardown(&mut self) {
        self.interrupt();
        if let Some(mut device) = self.device.take() {
            device.close();
            info!("[Playback] Output device released.");
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.clock.next_start_time()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.active.values()
    }

    pub fn device(&self) -> Option<&O> {
        self.device.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }
}

impl<O: OutputDevice> Drop for PlaybackScheduler<O> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ManualOutput {
        now: f64,
        started: Vec<(PlaybackId, f64, f64)>,
        stopped: Vec<PlaybackId>,
        closed: usize,
    }

    impl OutputDevice for ManualOutput {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn play_at(&mut self, id: PlaybackId, buffer: Arc<AudioBuffer>, start_at: f64) -> Result<()> {
            self.started.push((id, start_at, buffer.duration()));
            Ok(())
        }

        fn stop(&mut self, id: PlaybackId) {
            self.stopped.push(id);
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    fn chunk(seconds: f64) -> AudioBuffer {
        let frames = (24000.0 * seconds) as usize;
        AudioBuffer::new(24000, vec![vec![0.0; frames]])
    }

    fn scheduler_at(now: f64) -> PlaybackScheduler<ManualOutput> {
        PlaybackScheduler::new(ManualOutput {
            now,
            ..Default::default()
        })
    }

    #[test]
    fn chunks_play_back_to_back() {
        let mut scheduler = scheduler_at(0.25);
        let durations = [0.5, 0.125, 1.0, 0.25];
        for d in durations {
            scheduler.schedule(chunk(d)).unwrap();
        }

        let started = &scheduler.device().unwrap().started;
        let mut expected_start = 0.25;
        for (i, (_, start, duration)) in started.iter().enumerate() {
            assert!((start - expected_start).abs() < 1e-9, "chunk {} starts at {}", i, start);
            expected_start += duration;
        }
        assert!((scheduler.next_start_time() - expected_start).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 4);
    }

    #[test]
    fn late_chunk_snaps_to_device_time() {
        let mut scheduler = scheduler_at(0.0);
        scheduler.schedule(chunk(0.5)).unwrap();
        scheduler.device.as_mut().unwrap().now = 3.0;
        scheduler.schedule(chunk(0.5)).unwrap();

        let started = &scheduler.device().unwrap().started;
        assert_eq!(started[1].1, 3.0);
        assert_eq!(scheduler.next_start_time(), 3.5);
    }

    #[test]
    fn ended_chunks_leave_the_active_set() {
        let mut scheduler = scheduler_at(0.0);
        let first = scheduler.schedule(chunk(0.5)).unwrap();
        let second = scheduler.schedule(chunk(0.5)).unwrap();

        assert!(scheduler.on_ended(first));
        assert!(!scheduler.on_ended(first));
        assert_eq!(scheduler.handles().map(|h| h.id).collect::<Vec<_>>(), vec![second]);
    }

    #[test]
    fn interrupt_stops_everything_and_rewinds() {
        let mut scheduler = scheduler_at(1.0);
        for _ in 0..5 {
            scheduler.schedule(chunk(0.5)).unwrap();
        }

        assert_eq!(scheduler.interrupt(), 5);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(scheduler.device().unwrap().stopped, vec![1, 2, 3, 4, 5]);

        // Device clock is ahead of the rewound cursor.
        scheduler.schedule(chunk(0.5)).unwrap();
        assert_eq!(scheduler.device().unwrap().started.last().unwrap().1, 1.0);
    }

    #[test]
    fn teardown_is_idempotent_and_releases_device() {
        let mut scheduler = scheduler_at(0.0);
        scheduler.schedule(chunk(0.5)).unwrap();
        scheduler.teardown();
        scheduler.teardown();

        assert!(scheduler.is_released());
        assert_eq!(scheduler.active_count(), 0);
        assert!(matches!(scheduler.schedule(chunk(0.1)), Err(TutorError::NotReady)));
    }
}
