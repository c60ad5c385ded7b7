//! Version information and build metadata display

use std::fmt;

pub struct VersionInfo {
    /// Package version from Cargo.toml
    pub daemon_version: &'static str,
    /// Target triple (e.g., x86_64-unknown-linux-gnu)
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
    /// Git commit hash (if available)
    pub git_commit: Option<&'static str>,
    pub build_timestamp: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            daemon_version: env!("CARGO_PKG_VERSION"),
            target: env!("TARGET"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            git_commit: option_env!("GIT_COMMIT_HASH"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        }
    }

    /// External services the daemon talks to
    pub fn collaborators(&self) -> Vec<&'static str> {
        vec![
            "baresip (SIP signaling, ctrl_tcp + aufile)",
            "OpenAI-compatible /audio/transcriptions",
            "OpenAI-compatible /chat/completions",
            "ElevenLabs /v1/text-to-speech",
        ]
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sipbot-daemon {}", self.daemon_version)?;
        writeln!(f)?;

        writeln!(f, "Build Information:")?;
        writeln!(f, "  Target:       {}", self.target)?;
        writeln!(f, "  Profile:      {}", self.profile)?;
        writeln!(f, "  Build Date:   {}", self.build_timestamp)?;

        if let Some(commit) = self.git_commit {
            writeln!(f, "  Git Commit:   {}", commit)?;
        }

        writeln!(f)?;
        writeln!(f, "Collaborators:")?;
        for service in self.collaborators() {
            writeln!(f, "  • {}", service)?;
        }

        Ok(())
    }
}

/// Short version string (for --version)
pub fn version_short() -> String {
    format!("sipbot-daemon {}", env!("CARGO_PKG_VERSION"))
}

/// Long version string (for `--help` footer and startup banner at debug)
pub fn version_long() -> String {
    VersionInfo::current().to_string()
}
