//! Collaborator interfaces used by the call loop

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sipbot_audio::AudioClip;

use crate::error::Result;

/// One completed user/assistant pair from earlier in the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Speech recognition
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Best-effort transcription of a 16kHz mono clip
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

/// Language generation
#[async_trait]
pub trait Responder: Send + Sync {
    /// Reply to `utterance`, given the earlier exchanges of this call (oldest first)
    async fn respond(&self, utterance: &str, history: &[Exchange]) -> Result<String>;
}

/// Speech synthesis
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into `output`, returning the written path
    async fn synthesize(&self, text: &str, output: &Path) -> Result<PathBuf>;
}
