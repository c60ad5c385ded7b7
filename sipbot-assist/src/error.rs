//! Error types for collaborator calls

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Empty {0} result")]
    Empty(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audio error: {0}")]
    Audio(#[from] sipbot_audio::AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistError {
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Map a non-2xx response into [`AssistError::Api`]
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Api { status, body }
    }
}
