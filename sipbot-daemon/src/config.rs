//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sipbot_assist::{DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_OPENAI_BASE_URL};
use sipbot_signaling::{ControlEndpoint, SipAccount};

/// Upper bound on remembered exchanges per call
pub const MAX_HISTORY_TURNS: usize = 50;

/// Settings rejected at startup
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("audio.listen_window_secs must be positive (got {0})")]
    InvalidListenWindow(f32),

    #[error("assist.history_turns must be at most {max} (got {got})")]
    HistoryTooLong { got: usize, max: usize },

    #[error("assist.timeout_secs must be positive")]
    InvalidTimeout,

    #[error("signaling.control is not a valid endpoint: {0}")]
    InvalidControl(String),
}

/// SIP account registered by baresip
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl SipConfig {
    pub fn account(&self) -> SipAccount {
        SipAccount {
            username: self.username.clone(),
            password: self.password.clone(),
            domain: self.domain.clone(),
        }
    }
}

/// baresip process and control transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Executable name or path
    pub binary: String,

    /// `unix:/path` or `tcp:host:port`
    pub control: String,

    /// Directory baresip reads `config` and `accounts` from
    pub config_dir: PathBuf,

    /// Extra arguments after `-f <config_dir>`
    pub startup_args: Vec<String>,

    /// Pause between ringing and `/accept`
    pub accept_delay_ms: u64,

    /// Time given to baresip to register before audio is opened
    pub startup_grace_ms: u64,

    /// SIP listen address written to baresip's config
    pub listen: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            binary: "baresip".to_string(),
            control: "unix:/tmp/baresip.sock".to_string(),
            config_dir: sipbot_paths::get_baresip_dir()
                .unwrap_or_else(|_| PathBuf::from(".baresip")),
            startup_args: vec!["-e".to_string(), "/ausrc_mute".to_string()],
            accept_delay_ms: 1000,
            startup_grace_ms: 2000,
            listen: "0.0.0.0:5060".to_string(),
        }
    }
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Audio device index (None = default device)
    pub device_index: Option<usize>,

    /// Length of each listening window
    pub listen_window_secs: f32,

    /// Write every captured clip to `<audio dir>/incoming.wav`
    pub keep_last_clip: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device_index: None,
            listen_window_secs: 5.0,
            keep_last_clip: false,
        }
    }
}

/// Transcription, chat and synthesis services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    pub openai_key: String,
    pub openai_base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub elevenlabs_key: String,
    pub elevenlabs_base_url: String,
    /// Premade voice name or voice ID
    pub tts_voice: String,
    pub tts_model: String,
    /// Bound on every single collaborator call
    pub timeout_secs: u64,
    /// Earlier exchanges sent along with each utterance
    pub history_turns: usize,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            elevenlabs_key: String::new(),
            elevenlabs_base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            tts_voice: "Rachel".to_string(),
            tts_model: "eleven_monolingual_v1".to_string(),
            timeout_secs: 30,
            history_turns: 6,
        }
    }
}

/// What callers hear once the call is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    /// Synthesized on every call unless `file` is set
    pub text: String,

    /// Pre-recorded WAV played instead of synthesizing `text`
    pub file: Option<PathBuf>,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            text: "Hello, this is an AI assistant. How can I help you today?".to_string(),
            file: None,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SipbotConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub sip: SipConfig,
    pub signaling: SignalingConfig,
    pub audio: AudioSettings,
    pub assist: AssistConfig,
    pub greeting: GreetingConfig,
}

impl SipbotConfig {
    /// Load from the default location, or create it with defaults
    pub fn load() -> Result<Self> {
        let path = sipbot_paths::get_config_file_path()
            .context("Failed to resolve config file path")?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, or create default
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            let mut config: SipbotConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;

            config.config_path = path.to_path_buf();
            Ok(config)
        } else {
            let config = Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Vec<&'static str> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    /// Returns the names of the variables that took effect.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&'static str, &mut String); 6] = [
            ("OPENAI_API_KEY", &mut self.assist.openai_key),
            ("ELEVENLABS_API_KEY", &mut self.assist.elevenlabs_key),
            ("SIP_USERNAME", &mut self.sip.username),
            ("SIP_PASSWORD", &mut self.sip.password),
            ("SIP_DOMAIN", &mut self.sip.domain),
            ("TTS_VOICE", &mut self.assist.tts_voice),
        ];

        let mut applied = Vec::new();
        for (key, field) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value;
                applied.push(key);
            }
        }
        applied
    }

    /// Reject unusable settings; returns warnings for degraded-but-runnable ones
    pub fn validate(&self) -> std::result::Result<Vec<String>, ConfigError> {
        let window = self.audio.listen_window_secs;
        if !(window.is_finite() && window > 0.0) {
            return Err(ConfigError::InvalidListenWindow(window));
        }
        if self.assist.history_turns > MAX_HISTORY_TURNS {
            return Err(ConfigError::HistoryTooLong {
                got: self.assist.history_turns,
                max: MAX_HISTORY_TURNS,
            });
        }
        if self.assist.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.control_endpoint()?;

        let mut warnings = Vec::new();
        if self.assist.openai_key.is_empty() {
            warnings.push("No OpenAI API key: transcription and replies will fall back to apologies".to_string());
        }
        if self.assist.elevenlabs_key.is_empty() {
            warnings.push("No ElevenLabs API key: replies will not be spoken".to_string());
        }
        if self.sip.username.is_empty() || self.sip.domain.is_empty() {
            warnings.push("SIP username or domain is empty: baresip will not register".to_string());
        }
        if let Some(file) = &self.greeting.file {
            if !file.exists() {
                warnings.push(format!("Greeting file {} does not exist", file.display()));
            }
        }
        Ok(warnings)
    }

    pub fn control_endpoint(&self) -> std::result::Result<ControlEndpoint, ConfigError> {
        self.signaling
            .control
            .parse()
            .map_err(|_| ConfigError::InvalidControl(self.signaling.control.clone()))
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_secs_f32(self.audio.listen_window_secs)
    }

    pub fn accept_delay(&self) -> Duration {
        Duration::from_millis(self.signaling.accept_delay_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.signaling.startup_grace_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.assist.timeout_secs)
    }

    /// Greeting file with a leading `~/` expanded
    pub fn greeting_file(&self) -> Option<PathBuf> {
        self.greeting.file.as_deref().map(expand_home)
    }
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
