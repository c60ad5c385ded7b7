use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid control endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to start signaling process '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signaling process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Invalid SIP account: {0}")]
    InvalidAccount(String),
}

pub type Result<T> = std::result::Result<T, SignalingError>;
