//! Fire-and-forget command channel to baresip's control socket

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;

use crate::error::{Result, SignalingError};

/// Answer the ringing call
pub const CMD_ACCEPT: &str = "/accept";

/// Mute the local audio source (required before file playback)
pub const CMD_MUTE_SOURCE: &str = "/ausrc_mute";

/// Play a file into the call; takes the path as argument
pub const CMD_PLAY_FILE: &str = "/auplay";

/// Where baresip listens for commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for ControlEndpoint {
    type Err = SignalingError;

    /// Accepts `unix:/path`, `tcp:host:port`, or a bare absolute socket path
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(SignalingError::InvalidEndpoint(s.to_string()));
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if let Some(addr) = s.strip_prefix("tcp:") {
            if !addr.contains(':') {
                return Err(SignalingError::InvalidEndpoint(s.to_string()));
            }
            Ok(Self::Tcp(addr.to_string()))
        } else if s.starts_with('/') {
            Ok(Self::Unix(PathBuf::from(s)))
        } else {
            Err(SignalingError::InvalidEndpoint(s.to_string()))
        }
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Anything that can deliver control commands to the signaling process
///
/// Implementations never fail loudly: an undeliverable command is logged and
/// dropped so a single missed command cannot take down a live call.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Write one command line; does not wait for a reply
    async fn send(&self, command: &str);

    async fn accept_call(&self) {
        self.send(CMD_ACCEPT).await;
    }

    async fn mute_source(&self) {
        self.send(CMD_MUTE_SOURCE).await;
    }

    /// Mute the local source, then play `path` into the call
    async fn play_file(&self, path: &Path) {
        self.mute_source().await;
        self.send(&format!("{} {}", CMD_PLAY_FILE, path.display())).await;
    }
}

enum ControlStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl ControlStream {
    async fn connect(endpoint: &ControlEndpoint) -> std::io::Result<Self> {
        match endpoint {
            ControlEndpoint::Unix(path) => Ok(Self::Unix(UnixStream::connect(path).await?)),
            ControlEndpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(Self::Tcp(stream))
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        match self {
            Self::Unix(stream) => {
                stream.write_all(&bytes).await?;
                stream.flush().await
            }
            Self::Tcp(stream) => {
                stream.write_all(&bytes).await?;
                stream.flush().await
            }
        }
    }
}

/// Persistent connection to the control endpoint
///
/// The connection is opened on first use and reused. A failed write drops it so
/// the next command reconnects.
pub struct ControlChannel {
    endpoint: ControlEndpoint,
    stream: Mutex<Option<ControlStream>>,
}

impl ControlChannel {
    pub fn new(endpoint: ControlEndpoint) -> Self {
        Self {
            endpoint,
            stream: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Check whether a connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Write a command, reporting failure instead of swallowing it
    pub async fn try_send(&self, command: &str) -> Result<()> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            let stream = ControlStream::connect(&self.endpoint).await?;
            tracing::debug!("Control channel connected to {}", self.endpoint);
            *guard = Some(stream);
        }

        if let Some(stream) = guard.as_mut() {
            if let Err(e) = stream.write_line(command).await {
                *guard = None;
                return Err(e.into());
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CommandSink for ControlChannel {
    async fn send(&self, command: &str) {
        tracing::info!("Sending command to baresip: {}", command);
        if let Err(e) = self.try_send(command).await {
            tracing::warn!("Failed to send '{}' to {}: {}", command, self.endpoint, e);
        }
    }
}
