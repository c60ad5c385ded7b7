//! Mono resampling with rubato
//!
//! Converts device-rate audio to the 16kHz capture rate. The sinc resampler
//! consumes fixed 100ms blocks, so incoming callback frames are accumulated
//! until a full block is available.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, Result};

/// Streaming mono resampler
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    chunk_size: usize,
    pending: Vec<f32>,
    resampler: Option<SincFixedIn<f32>>,
}

impl Resampler {
    /// Create new resampler (passthrough when the rates match)
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        let chunk_size = (source_rate as f32 * 0.1) as usize;
        let resampler = if source_rate != target_rate {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let inner = SincFixedIn::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                params,
                chunk_size,
                1,
            )
            .map_err(|e| AudioError::Resample(format!("failed to create resampler: {:?}", e)))?;
            Some(inner)
        } else {
            None
        };

        Ok(Self {
            source_rate,
            target_rate,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
            resampler,
        })
    }

    /// Feed device-rate samples, get back whatever complete blocks produced
    ///
    /// May return an empty vec while a block is still filling.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let block: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            let planar = resampler
                .process(&[block], None)
                .map_err(AudioError::resample)?;
            if let Some(channel) = planar.into_iter().next() {
                output.extend(channel);
            }
        }

        Ok(output)
    }

    /// Drop held samples and filter history so the next block starts clean
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Samples waiting for a full block
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take the first channel of each interleaved frame
    ///
    /// Averaging would halve the level when the mic is only wired to one side.
    pub fn downmix_first_channel(data: &[f32], channels: u16) -> Vec<f32> {
        if channels <= 1 {
            return data.to_vec();
        }
        data.chunks(channels as usize).map(|frame| frame[0]).collect()
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}
