//! OpenSSH-backed transport.
//!
//! Forwards run `ssh -N -L` as a child process. Password and key passphrase
//! authentication go through `sshpass`, which reads the secret from the
//! `SSHPASS` environment variable of the child only.

use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{Transport, Tunnel, TunnelError};
use crate::services::config::SshConfig;

const READY_TIMEOUT: Duration = Duration::from_secs(15);
const READY_POLL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    port: u16,
    user: String,
    key_path: Option<String>,
    password: Option<String>,
    passphrase: Option<String>,
}

impl SshTransport {
    pub fn new(config: &SshConfig, password: Option<String>, passphrase: Option<String>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            key_path: Some(config.key_path.clone()).filter(|path| !path.is_empty()),
            password,
            passphrase,
        }
    }

    /// Secrets resolved from the environment variables named in the config
    pub fn from_config(config: &SshConfig) -> Self {
        Self::new(config, config.password(), config.passphrase())
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `ssh` or `sshpass ... ssh`, with the shared options applied
    fn command(&self) -> Command {
        let secret = self.password.as_ref().or(self.passphrase.as_ref());
        let mut command = match secret {
            Some(secret) => {
                let mut command = Command::new("sshpass");
                command.env("SSHPASS", secret).arg("-e");
                if self.password.is_none() {
                    command.args(["-P", "passphrase"]);
                }
                command.arg("ssh");
                command
            }
            None => {
                let mut command = Command::new("ssh");
                command.args(["-o", "BatchMode=yes"]);
                command
            }
        };

        command
            .args(["-p", &self.port.to_string()])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", &format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS)])
            .args(["-o", "ServerAliveInterval=30"]);
        if let Some(key) = &self.key_path {
            command.args(["-i", key]);
        }
        if self.password.is_some() {
            command.args(["-o", "PreferredAuthentications=password,keyboard-interactive"]);
        }
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    fn program(&self) -> &'static str {
        if self.password.is_some() || self.passphrase.is_some() {
            "sshpass"
        } else {
            "ssh"
        }
    }

    async fn run_remote(&self, remote_command: &str) -> Result<std::process::Output, TunnelError> {
        let mut command = self.command();
        command
            .arg(self.destination())
            .arg(remote_command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.output().await.map_err(|source| TunnelError::Spawn {
            program: self.program().to_string(),
            source,
        })
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn describe(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    async fn open(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, TunnelError> {
        let local_addr = SocketAddr::from(([127, 0, 0, 1], local_port));
        let remote = format!("{}:{}", remote_host, remote_port);

        let mut command = self.command();
        command
            .args(["-N", "-o", "ExitOnForwardFailure=yes"])
            .arg("-L")
            .arg(format!("127.0.0.1:{}:{}", local_port, remote))
            .arg(self.destination())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| TunnelError::Spawn {
            program: self.program().to_string(),
            source,
        })?;

        let started = tokio::time::Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|source| TunnelError::Spawn {
                program: self.program().to_string(),
                source,
            })? {
                let stderr = read_stderr(&mut child).await;
                return Err(TunnelError::ExitedEarly {
                    remote,
                    stderr: format!("{} ({})", stderr.trim(), status),
                });
            }

            if TcpStream::connect(local_addr).await.is_ok() {
                break;
            }

            if started.elapsed() >= READY_TIMEOUT {
                let _ = child.kill().await;
                return Err(TunnelError::NotReady {
                    remote,
                    seconds: READY_TIMEOUT.as_secs(),
                });
            }
            tokio::time::sleep(READY_POLL).await;
        }

        debug!("[SSH] Forward {} -> {} ready", local_addr, remote);
        Ok(Box::new(SshTunnel {
            child,
            local_addr,
            remote,
        }))
    }

    async fn test_connection(&self) -> Result<(), TunnelError> {
        let output = self.run_remote("true").await?;
        if output.status.success() {
            info!("[SSH] Connection to {} succeeded", self.describe());
            Ok(())
        } else {
            Err(TunnelError::Connection {
                host: self.describe(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn read_remote_file(&self, path: &str) -> Result<Option<Vec<u8>>, TunnelError> {
        let quoted = shell_quote(path);
        let script = format!(
            "if [ -f {0} ]; then cat {0} 2>/dev/null || sudo -n cat {0}; else exit 3; fi",
            quoted
        );
        let output = self.run_remote(&script).await?;

        match output.status.code() {
            Some(0) => Ok(Some(output.stdout)),
            Some(3) => Ok(None),
            // ssh itself reports failures with 255
            Some(255) => Err(TunnelError::Connection {
                host: self.describe(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            _ => Err(TunnelError::Command {
                host: self.describe(),
                message: format!(
                    "reading {} failed: {}",
                    path,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }
}

/// Running `ssh -N -L` child process
pub struct SshTunnel {
    child: Child,
    local_addr: SocketAddr,
    remote: String,
}

#[async_trait]
impl Tunnel for SshTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> String {
        self.remote.clone()
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        if self.child.try_wait().ok().flatten().is_some() {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| TunnelError::Command {
                host: self.remote.clone(),
                message: format!("failed to stop tunnel: {}", e),
            })
    }
}

async fn read_stderr(child: &mut Child) -> String {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr).await;
    }
    stderr
}

/// Single-quote for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/mattermost/config.json"), "'/opt/mattermost/config.json'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_program_depends_on_secret() {
        let config = SshConfig {
            host: "mm.example.org".to_string(),
            user: "deploy".to_string(),
            ..SshConfig::default()
        };

        let keyed = SshTransport::new(&config, None, None);
        assert_eq!(keyed.program(), "ssh");
        assert_eq!(keyed.describe(), "deploy@mm.example.org:22");

        let password = SshTransport::new(&config, Some("pw".to_string()), None);
        assert_eq!(password.program(), "sshpass");
    }
}
