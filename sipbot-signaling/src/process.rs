//! baresip configuration and child process supervision

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::control::ControlEndpoint;
use crate::error::{Result, SignalingError};

/// SIP registration credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipAccount {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl SipAccount {
    /// baresip `accounts` line: `<sip:user@domain>;auth_pass=...`
    pub fn accounts_line(&self) -> Result<String> {
        if self.username.trim().is_empty() || self.domain.trim().is_empty() {
            return Err(SignalingError::InvalidAccount(
                "username and domain are required".to_string(),
            ));
        }
        let mut line = format!("<sip:{}@{}>", self.username.trim(), self.domain.trim());
        if !self.password.is_empty() {
            line.push_str(";auth_pass=");
            line.push_str(&self.password);
        }
        Ok(line)
    }
}

/// Settings written into baresip's `config` file
#[derive(Debug, Clone)]
pub struct BaresipOptions {
    /// SIP listen address (e.g. `0.0.0.0:5060`)
    pub sip_listen: String,
    /// Audio sample rate for source and player
    pub sample_rate: u32,
    /// Control endpoint; TCP endpoints are configured as `ctrl_tcp_listen`
    pub control: ControlEndpoint,
}

impl Default for BaresipOptions {
    fn default() -> Self {
        Self {
            sip_listen: "0.0.0.0:5060".to_string(),
            sample_rate: 16000,
            control: ControlEndpoint::Unix(PathBuf::from("/tmp/baresip.sock")),
        }
    }
}

fn render_config(options: &BaresipOptions) -> String {
    let mut config = format!(
        "# Generated by sipbot; edits are overwritten at startup\n\
         module_path /usr/local/lib/baresip/modules\n\
         audio_player alsa,default\n\
         audio_source alsa,default\n\
         audio_alert alsa,default\n\
         sip_listen {listen}\n\
         call_max_calls 1\n\
         audio_buffer 20-160\n\
         ausrc_srate {rate}\n\
         auplay_srate {rate}\n\
         ausrc_channels 1\n\
         auplay_channels 1\n",
        listen = options.sip_listen,
        rate = options.sample_rate,
    );

    if let ControlEndpoint::Tcp(addr) = &options.control {
        config.push_str(&format!("ctrl_tcp_listen {}\n", addr));
    }

    for module in [
        "codec/opus",
        "codec/g711",
        "codec/g722",
        "auloop",
        "stdio",
        "cons",
        "contact",
        "menu",
        "ctrl_tcp",
        "aufile",
    ] {
        config.push_str("module ");
        config.push_str(module);
        config.push('\n');
    }

    config
}

/// Write baresip's `config` and `accounts` files into `dir`
pub fn write_baresip_config(dir: &Path, account: &SipAccount, options: &BaresipOptions) -> Result<()> {
    let accounts = account.accounts_line()?;

    fs::create_dir_all(dir)?;
    fs::write(dir.join("config"), render_config(options))?;
    fs::write(dir.join("accounts"), format!("{}\n", accounts))?;

    // accounts holds the SIP password
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.join("accounts"), fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("Baresip configuration written to {}", dir.display());
    Ok(())
}

/// Running baresip child
pub struct SignalingProcess {
    binary: String,
    child: Child,
    stderr_task: Option<JoinHandle<()>>,
}

impl SignalingProcess {
    /// Spawn baresip with piped output
    ///
    /// Returns the process handle and its stdout, which feeds the event monitor.
    /// A stale Unix control socket is removed first so baresip can bind it.
    pub fn spawn(
        binary: &str,
        args: &[String],
        config_dir: &Path,
        control: &ControlEndpoint,
    ) -> Result<(Self, ChildStdout)> {
        if let ControlEndpoint::Unix(path) = control {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }

        tracing::info!("Starting {} (config: {})", binary, config_dir.display());

        let mut child = Command::new(binary)
            .arg("-f")
            .arg(config_dir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SignalingError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(SignalingError::MissingPipe("stdout"))?;

        // Drain stderr so the pipe never fills and stalls baresip
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("baresip stderr: {}", line);
                }
            })
        });

        if let Some(pid) = child.id() {
            tracing::info!("Baresip started (pid {})", pid);
        }

        Ok((
            Self {
                binary: binary.to_string(),
                child,
                stderr_task,
            },
            stdout,
        ))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check whether the child has exited without blocking
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Kill and reap the child; closes its stdout and ends the monitor
    pub async fn shutdown(mut self) -> Result<()> {
        if !self.has_exited() {
            tracing::info!("Stopping {}", self.binary);
            self.child.kill().await?;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SipAccount {
        SipAccount {
            username: "bot".to_string(),
            password: "secret".to_string(),
            domain: "sip.example.com".to_string(),
        }
    }

    #[test]
    fn test_accounts_line() {
        assert_eq!(
            account().accounts_line().unwrap(),
            "<sip:bot@sip.example.com>;auth_pass=secret"
        );

        let no_password = SipAccount {
            password: String::new(),
            ..account()
        };
        assert_eq!(no_password.accounts_line().unwrap(), "<sip:bot@sip.example.com>");
    }

    #[test]
    fn test_accounts_line_requires_user_and_domain() {
        assert!(SipAccount::default().accounts_line().is_err());
    }

    #[test]
    fn test_render_config_tcp_control() {
        let options = BaresipOptions {
            control: ControlEndpoint::Tcp("127.0.0.1:4444".to_string()),
            ..Default::default()
        };
        let config = render_config(&options);
        assert!(config.contains("call_max_calls 1"));
        assert!(config.contains("ausrc_srate 16000"));
        assert!(config.contains("ctrl_tcp_listen 127.0.0.1:4444"));
        assert!(config.contains("module aufile"));
    }

    #[test]
    fn test_write_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(".baresip");

        write_baresip_config(&target, &account(), &BaresipOptions::default()).unwrap();

        let config = fs::read_to_string(target.join("config")).unwrap();
        assert!(config.contains("sip_listen 0.0.0.0:5060"));
        assert!(!config.contains("ctrl_tcp_listen"));

        let accounts = fs::read_to_string(target.join("accounts")).unwrap();
        assert_eq!(accounts.trim(), "<sip:bot@sip.example.com>;auth_pass=secret");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let result = SignalingProcess::spawn(
            "sipbot-no-such-binary",
            &[],
            dir.path(),
            &ControlEndpoint::Unix(dir.path().join("ctrl.sock")),
        );
        assert!(matches!(result, Err(SignalingError::Spawn { .. })));
    }
}
