//! Arm/disarm capture buffer shared between the audio callback and the turn loop

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::clip::AudioClip;

/// Accumulates frames from the audio callback while armed.
///
/// The device callback calls [`push_frame`](Self::push_frame) continuously; the
/// turn loop brackets each listening window with [`arm`](Self::arm) and
/// [`disarm`](Self::disarm). The armed flag is re-checked under the lock, so a
/// frame racing with `disarm` either lands in the returned clip or is dropped,
/// never both and never in the next window.
pub struct CaptureBuffer {
    sample_rate: u32,
    armed: AtomicBool,
    /// Bumped by every `arm`, so producers can tell listening windows apart
    generation: AtomicU64,
    samples: Mutex<Vec<f32>>,
    frames: AtomicUsize,
}

impl CaptureBuffer {
    /// Create an empty, disarmed buffer for mono audio at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            armed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
            frames: AtomicUsize::new(0),
        }
    }

    /// Clear stored audio and start keeping incoming frames
    pub fn arm(&self) {
        let mut samples = self.samples.lock();
        samples.clear();
        self.frames.store(0, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.armed.store(true, Ordering::Release);
    }

    /// Stop keeping frames and take everything captured since [`arm`](Self::arm)
    ///
    /// Returns an empty clip if the buffer was never armed or no frames arrived.
    pub fn disarm(&self) -> AudioClip {
        let taken = {
            let mut samples = self.samples.lock();
            self.armed.store(false, Ordering::Release);
            std::mem::take(&mut *samples)
        };

        let frames = self.frames.swap(0, Ordering::Relaxed);
        tracing::debug!(frames, samples = taken.len(), "capture window closed");

        AudioClip::new(taken, self.sample_rate)
    }

    /// Append one frame from the audio callback (dropped while disarmed)
    ///
    /// Returns whether the frame was kept.
    pub fn push_frame(&self, frame: &[f32]) -> bool {
        // Fast path for the common case: no call, nothing armed.
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }

        let mut samples = self.samples.lock();
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        samples.extend_from_slice(frame);
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Append a frame only if window `generation` is still the armed one
    ///
    /// For producers that hold state across callbacks: audio prepared for one
    /// window is dropped rather than leaking into the next.
    pub fn push_window_frame(&self, generation: u64, frame: &[f32]) -> bool {
        let mut samples = self.samples.lock();
        if !self.armed.load(Ordering::Acquire)
            || self.generation.load(Ordering::Acquire) != generation
        {
            return false;
        }
        samples.extend_from_slice(frame);
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Generation of the current window, or `None` while disarmed
    pub fn armed_generation(&self) -> Option<u64> {
        let _guard = self.samples.lock();
        self.armed
            .load(Ordering::Acquire)
            .then(|| self.generation.load(Ordering::Acquire))
    }

    /// Check if the buffer is currently keeping frames
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Number of frames kept since the last arm
    pub fn frames_captured(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }

    /// Sample rate of produced clips
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
