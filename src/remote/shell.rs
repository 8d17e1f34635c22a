use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::RemoteError;

/// Connection coordinates for one remote host.
#[derive(Debug, Clone)]
pub struct HostSpec {
    pub host: String,
    pub user_name: String,
    pub identity_file: PathBuf,
    pub port: u16,
}

impl HostSpec {
    pub fn new(host: &str, user_name: &str, identity_file: &Path, port: u16) -> Self {
        HostSpec {
            host: host.to_owned(),
            user_name: user_name.to_owned(),
            identity_file: identity_file.to_owned(),
            port,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user_name, self.host)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Optional observer for stdout lines as they arrive.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Transport seam. The production implementation shells out to the system
/// `ssh`/`scp`; tests substitute an in-memory fake.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(
        &self,
        host: &HostSpec,
        command: &str,
        on_line: Option<LineSink>,
    ) -> Result<ExecOutput, RemoteError>;

    async fn upload(
        &self,
        host: &HostSpec,
        local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError>;

    async fn download(
        &self,
        host: &HostSpec,
        remote: &str,
        local: &Path,
    ) -> Result<(), RemoteError>;

    /// Cheap reachability probe: is the SSH TCP port accepting connections?
    async fn probe(&self, host: &HostSpec, timeout: Duration) -> Result<(), RemoteError>;
}

/// `ssh`/`scp` process adapter.
pub struct OpenSsh;

// ssh exits 255 on transport failure; anything else is the remote command.
const SSH_TRANSPORT_FAILURE: i32 = 255;

impl OpenSsh {
    fn ssh_options(host: &HostSpec) -> Vec<String> {
        vec![
            "-i".to_owned(),
            host.identity_file.display().to_string(),
            "-o".to_owned(),
            "StrictHostKeyChecking=no".to_owned(),
            "-o".to_owned(),
            "BatchMode=yes".to_owned(),
        ]
    }
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn exec(
        &self,
        host: &HostSpec,
        command: &str,
        on_line: Option<LineSink>,
    ) -> Result<ExecOutput, RemoteError> {
        debug!(host = %host.host, command, "remote exec");
        let mut child = Command::new("ssh")
            .args(Self::ssh_options(host))
            .arg("-p")
            .arg(host.port.to_string())
            .arg(host.destination())
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| RemoteError::Io {
                context: "spawn ssh",
                source: err,
            })?;

        let stdout_pipe = child.stdout.take().ok_or_else(|| RemoteError::Io {
            context: "capture ssh stdout",
            source: std::io::Error::other("stdout not piped"),
        })?;
        let stderr_pipe = child.stderr.take().ok_or_else(|| RemoteError::Io {
            context: "capture ssh stderr",
            source: std::io::Error::other("stderr not piped"),
        })?;

        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout_pipe).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(sink) = on_line.as_ref() {
                    sink(&line);
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut stderr = String::new();
        let mut stderr_reader = BufReader::new(stderr_pipe);
        stderr_reader
            .read_to_string(&mut stderr)
            .await
            .map_err(|err| RemoteError::Io {
                context: "read ssh stderr",
                source: err,
            })?;

        let status = child.wait().await.map_err(|err| RemoteError::Io {
            context: "wait for ssh",
            source: err,
        })?;
        let stdout = stdout_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);

        if exit_code == SSH_TRANSPORT_FAILURE {
            return Err(RemoteError::Transient {
                host: host.host.clone(),
                message: stderr.trim().to_owned(),
            });
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn upload(
        &self,
        host: &HostSpec,
        local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError> {
        debug!(host = %host.host, local = %local.display(), remote, "upload");
        let output = Command::new("scp")
            .args(Self::ssh_options(host))
            .arg("-P")
            .arg(host.port.to_string())
            .arg(local)
            .arg(format!("{}:{}", host.destination(), remote))
            .output()
            .await
            .map_err(|err| RemoteError::Io {
                context: "spawn scp",
                source: err,
            })?;
        if !output.status.success() {
            return Err(RemoteError::Transfer {
                host: host.host.clone(),
                path: remote.to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    async fn download(
        &self,
        host: &HostSpec,
        remote: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        debug!(host = %host.host, remote, local = %local.display(), "download");
        let output = Command::new("scp")
            .args(Self::ssh_options(host))
            .arg("-P")
            .arg(host.port.to_string())
            .arg(format!("{}:{}", host.destination(), remote))
            .arg(local)
            .output()
            .await
            .map_err(|err| RemoteError::Io {
                context: "spawn scp",
                source: err,
            })?;
        if !output.status.success() {
            return Err(RemoteError::Transfer {
                host: host.host.clone(),
                path: remote.to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    async fn probe(&self, host: &HostSpec, timeout: Duration) -> Result<(), RemoteError> {
        let address = format!("{}:{}", host.host, host.port);
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&address)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(RemoteError::Transient {
                host: host.host.clone(),
                message: err.to_string(),
            }),
            Err(_) => Err(RemoteError::Transient {
                host: host.host.clone(),
                message: format!("connect timed out after {}ms", timeout.as_millis()),
            }),
        }
    }
}
