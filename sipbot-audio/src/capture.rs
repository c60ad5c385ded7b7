//! Always-on audio input with cpal
//!
//! Opens the input device once at startup. While the shared [`CaptureBuffer`]
//! is armed, callback frames are downmixed, resampled to the capture rate and
//! appended to the current window.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::buffer::CaptureBuffer;
use crate::error::{AudioError, Result};
use crate::resampler::Resampler;
use crate::AudioConfig;

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// Resamples callback audio into the buffer's current listening window
///
/// The resampler holds up to one block between callbacks. It is reset at the
/// start of every window, and output produced for a window that has since
/// closed is dropped, so a clip only holds audio from its own window.
pub struct WindowFeed {
    resampler: Resampler,
    window: Option<u64>,
}

impl WindowFeed {
    pub fn new(resampler: Resampler) -> Self {
        Self {
            resampler,
            window: None,
        }
    }

    /// Feed one mono callback block; returns the number of samples kept
    pub fn push(&mut self, mono: &[f32], buffer: &CaptureBuffer) -> Result<usize> {
        let Some(generation) = buffer.armed_generation() else {
            return Ok(0);
        };
        if self.window != Some(generation) {
            self.resampler.reset();
            self.window = Some(generation);
        }

        let frame = self.resampler.process(mono)?;
        if !frame.is_empty() && buffer.push_window_frame(generation, &frame) {
            Ok(frame.len())
        } else {
            Ok(0)
        }
    }
}

/// Running input stream bound to a capture buffer
///
/// Dropping the value stops the stream.
pub struct AudioInput {
    config: AudioConfig,
    buffer: Arc<CaptureBuffer>,
    stream: Option<Stream>,
    device_name: String,
}

impl AudioInput {
    /// List all available input devices
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for (index, device) in host
            .input_devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
            .enumerate()
        {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {}", index));

            let (max_input_channels, default_sample_rate) = device
                .default_input_config()
                .map(|c| (c.channels(), c.sample_rate().0))
                .unwrap_or((0, 0));

            devices.push(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
                default_sample_rate,
            });
        }

        Ok(devices)
    }

    /// Print the device list (for `--list-devices`)
    pub fn print_devices() -> Result<()> {
        let devices = Self::list_devices()?;

        println!("\n{}", "=".repeat(78));
        println!("Available Input Devices:");
        println!("{}\n", "=".repeat(78));

        for device in devices {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("{:3}: {}{}", device.index, device.name, default_marker);
            println!("     Channels: {}", device.max_input_channels);
            println!("     Sample Rate: {} Hz\n", device.default_sample_rate);
        }

        println!("{}", "=".repeat(78));
        Ok(())
    }

    /// Open the configured device and start delivering frames into `buffer`
    pub fn start(config: AudioConfig, buffer: Arc<CaptureBuffer>) -> Result<Self> {
        if config.sample_rate != buffer.sample_rate() {
            return Err(AudioError::invalid_config(format!(
                "Capture rate {} Hz does not match buffer rate {} Hz",
                config.sample_rate,
                buffer.sample_rate()
            )));
        }

        let device = Self::select_device(config.device_index)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::device(format!("Failed to get device config: {}", e)))?;
        let source_rate = supported.sample_rate().0;
        let source_channels = supported.channels();

        tracing::info!(
            "Audio input: {} ({} Hz, {} ch → {} Hz mono, blocksize {})",
            device_name,
            source_rate,
            source_channels,
            config.sample_rate,
            config.blocksize
        );

        let feed = Mutex::new(WindowFeed::new(Resampler::new(source_rate, config.sample_rate)?));

        let stream_config = StreamConfig {
            channels: source_channels,
            sample_rate: cpal::SampleRate(source_rate),
            buffer_size: cpal::BufferSize::Fixed(config.blocksize as u32),
        };

        let sink = Arc::clone(&buffer);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !sink.is_armed() {
                        return;
                    }
                    let mono = Resampler::downmix_first_channel(data, source_channels);
                    if let Err(e) = feed.lock().push(&mono, &sink) {
                        tracing::warn!("Resampling error: {}", e);
                    }
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::stream(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            config,
            buffer,
            stream: Some(stream),
            device_name,
        })
    }

    fn select_device(device_index: Option<usize>) -> Result<Device> {
        let host = cpal::default_host();
        match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
                .nth(index)
                .ok_or_else(|| AudioError::device(format!("Device index {} not found", index))),
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::device("No default input device found")),
        }
    }

    /// Stop the stream (buffer contents are left alone)
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("Audio input stopped ({})", self.device_name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn buffer(&self) -> &Arc<CaptureBuffer> {
        &self.buffer
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_blocks(feed: &mut WindowFeed, buffer: &CaptureBuffer, value: f32, blocks: usize) {
        for _ in 0..blocks {
            feed.push(&[value; 1024], buffer).unwrap();
        }
    }

    #[test]
    fn test_nothing_resampled_while_disarmed() {
        let buffer = CaptureBuffer::new(16000);
        let mut feed = WindowFeed::new(Resampler::new(48000, 16000).unwrap());

        feed_blocks(&mut feed, &buffer, 9.0, 4);
        assert_eq!(feed.resampler.pending_len(), 0);

        buffer.arm();
        feed_blocks(&mut feed, &buffer, 0.1, 5);
        let clip = buffer.disarm();
        assert!(!clip.is_empty());
        assert!(clip.samples().iter().all(|s| s.abs() < 1.0));
    }

    #[test]
    fn test_held_block_does_not_leak_into_next_window() {
        let buffer = CaptureBuffer::new(16000);
        let mut feed = WindowFeed::new(Resampler::new(48000, 16000).unwrap());

        // 4096 samples at 48kHz: short of one 4800-sample block, so all held
        buffer.arm();
        feed_blocks(&mut feed, &buffer, 9.0, 4);
        assert!(buffer.disarm().is_empty());

        buffer.arm();
        feed_blocks(&mut feed, &buffer, 0.1, 5);
        let clip = buffer.disarm();
        assert!(!clip.is_empty());
        assert!(
            clip.samples().iter().all(|s| s.abs() < 1.0),
            "audio from the previous window reached the clip"
        );
    }

    #[test]
    fn test_passthrough_feed_keeps_window_audio() {
        let buffer = CaptureBuffer::new(16000);
        let mut feed = WindowFeed::new(Resampler::new(16000, 16000).unwrap());

        assert_eq!(feed.push(&[0.3; 160], &buffer).unwrap(), 0);
        buffer.arm();
        assert_eq!(feed.push(&[0.2; 160], &buffer).unwrap(), 160);
        assert_eq!(buffer.disarm().samples(), [0.2; 160].as_slice());
    }

    #[test]
    fn test_rate_mismatch_rejected() {
        let buffer = Arc::new(CaptureBuffer::new(8000));
        let result = AudioInput::start(AudioConfig::default(), buffer);
        assert!(matches!(result, Err(AudioError::InvalidConfig(_))));
    }
}
