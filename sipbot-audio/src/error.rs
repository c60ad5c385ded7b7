//! Capture and clip encoding errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    /// Device lookup or query failed
    #[error("input device: {0}")]
    Device(String),

    /// The cpal stream could not be built or started
    #[error("input stream: {0}")]
    Stream(String),

    #[error("invalid capture settings: {0}")]
    InvalidConfig(String),

    #[error("resampler: {0}")]
    Resample(String),

    #[error("WAV encoding: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AudioError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn resample(msg: impl std::fmt::Debug) -> Self {
        Self::Resample(format!("{:?}", msg))
    }
}
