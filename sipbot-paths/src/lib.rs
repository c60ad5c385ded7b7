//! Filesystem locations used by sipbot.
//!
//! Single source of truth for where sipbot keeps its configuration, logs and
//! the audio files exchanged with baresip.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/sipbot` | `~/.config/sipbot` |
//! | macOS    | `~/Library/Application Support/sipbot` | same as data dir |
//!
//! baresip reads its own configuration from `~/.baresip` by default.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "sipbot";

/// Configuration file name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Log file name inside the logs directory.
pub const LOG_FILE_NAME: &str = "sipbot.log";

/// Create `dir` (and parents) if missing, owner-only on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application data directory, creating it if needed.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory.
///
/// - **Linux**: `~/.config/sipbot`
/// - **elsewhere**: the data directory
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_private_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Default path of `config.toml`. The file itself is not created here.
pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the logs directory.
///
/// - **macOS**: `~/Library/Logs/sipbot`
/// - **elsewhere**: `<data_dir>/logs`
pub fn get_logs_dir() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    let logs_dir = dirs::home_dir()
        .ok_or(PathError::NoHomeDirectory)?
        .join("Library")
        .join("Logs")
        .join(APP_NAME);

    #[cfg(not(target_os = "macos"))]
    let logs_dir = get_data_dir()?.join("logs");

    ensure_private_dir(&logs_dir)?;
    Ok(logs_dir)
}

/// Directory for audio handed to baresip (greeting, replies) and debug clips.
///
/// Files here are overwritten every turn; nothing is kept across calls.
pub fn get_audio_dir() -> Result<PathBuf> {
    let audio_dir = get_data_dir()?.join("audio");
    ensure_private_dir(&audio_dir)?;
    Ok(audio_dir)
}

/// baresip's default configuration directory (`~/.baresip`).
pub fn get_baresip_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(PathError::NoHomeDirectory)?;
    Ok(home.join(".baresip"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_creation() {
        let dir = get_data_dir().expect("Should get data directory");
        assert!(dir.exists(), "Data directory should exist");
        assert!(dir.ends_with("sipbot"), "Should end with app name");
    }

    #[test]
    fn test_config_file_path() {
        let path = get_config_file_path().expect("Should get config path");
        assert!(path.ends_with("config.toml"));
        assert!(path.parent().unwrap().exists(), "Config directory should exist");
    }

    #[test]
    fn test_logs_dir() {
        let dir = get_logs_dir().expect("Should get logs directory");
        assert!(dir.exists(), "Logs directory should exist");
    }

    #[test]
    fn test_audio_dir() {
        let dir = get_audio_dir().expect("Should get audio directory");
        assert!(dir.exists(), "Audio directory should exist");
        assert!(dir.ends_with("audio"));
    }

    #[test]
    fn test_baresip_dir() {
        let dir = get_baresip_dir().expect("Should get baresip directory");
        assert!(dir.ends_with(".baresip"));
        assert!(dir.is_absolute());
    }

    #[test]
    fn test_ensure_private_dir_nested() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_private_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op
        ensure_private_dir(&nested).unwrap();
    }
}
