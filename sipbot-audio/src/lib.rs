//! sipbot audio capture
//!
//! Captures the call audio as a sequence of finite clips, one per listening
//! window of the turn-taking loop.
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal, native rate)
//!   │
//!   ├─> downmix (first channel) -> WindowFeed (rubato, reset per window) -> 16kHz mono
//!   │
//!   └─> CaptureBuffer::push_window_frame   (dropped unless the same window is armed)
//!           │
//!           └─> disarm() -> AudioClip (consumed once by transcription)
//! ```
//!
//! The input stream runs for the lifetime of the daemon. Frames keep arriving
//! whether or not a call is in progress; they are only resampled and kept
//! while the buffer is armed.

pub mod buffer;
pub mod capture;
pub mod clip;
pub mod error;
pub mod resampler;

pub use buffer::CaptureBuffer;
pub use capture::{AudioInput, DeviceInfo, WindowFeed};
pub use clip::AudioClip;
pub use error::{AudioError, Result};
pub use resampler::Resampler;

/// Capture sample rate (16kHz mono, what the transcription service expects)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Default audio blocksize (samples per callback)
pub const DEFAULT_BLOCKSIZE: usize = 1024;

/// Audio input configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate delivered to the capture buffer (default: 16000 Hz)
    pub sample_rate: u32,
    /// Samples per device callback (default: 1024)
    pub blocksize: usize,
    /// Device index (None = default input device)
    pub device_index: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            blocksize: DEFAULT_BLOCKSIZE,
            device_index: None,
        }
    }
}
