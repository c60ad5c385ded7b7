//! Finite mono audio clips produced by one arm/disarm cycle

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::Result;

/// Mono PCM clip (f32 samples in [-1, 1])
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Clip with no audio ("no audio" from the capture layer)
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.duration_secs())
    }

    /// Root-mean-square level, handy for "is anybody talking" log lines
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|s| s * s).sum::<f32>() / self.samples.len() as f32).sqrt()
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Encode as 16-bit PCM WAV bytes (upload format for transcription)
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, self.wav_spec())?;
            for &sample in &self.samples {
                writer.write_sample(to_i16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the clip as a 16-bit PCM WAV file
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = WavWriter::create(path, self.wav_spec())?;
        for &sample in &self.samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
        Ok(())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duration() {
        let clip = AudioClip::new(vec![0.0; 8000], 16000);
        assert_relative_eq!(clip.duration_secs(), 0.5);
        assert_eq!(clip.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_wav_bytes_header() {
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5, 1.0], 16000);
        let bytes = clip.to_wav_bytes().unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header + 4 samples * 2 bytes
        assert_eq!(bytes.len(), 44 + 8);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incoming.wav");

        let clip = AudioClip::new(vec![0.25; 1600], 16000);
        clip.write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), -i16::MAX);
        assert_eq!(to_i16(0.0), 0);
    }

    #[test]
    fn test_rms() {
        assert_eq!(AudioClip::empty(16000).rms(), 0.0);
        assert_relative_eq!(AudioClip::new(vec![0.5; 100], 16000).rms(), 0.5);
    }
}
