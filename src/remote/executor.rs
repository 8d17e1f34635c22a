use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{AppError, AppResult, RemoteError};

use super::retry::{retry, RetryPolicy};
use super::shell::{ExecOutput, HostSpec, LineSink, RemoteShell};

/// Shell access with a retry budget. Cloneable; every fan-out task carries
/// its own handle.
#[derive(Clone)]
pub struct Executor {
    shell: Arc<dyn RemoteShell>,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(shell: Arc<dyn RemoteShell>, policy: RetryPolicy) -> Self {
        Executor { shell, policy }
    }

    pub fn shell(&self) -> Arc<dyn RemoteShell> {
        Arc::clone(&self.shell)
    }

    /// Runs a command, retrying transient transport failures. The remote
    /// command's own exit code is returned, not retried.
    pub async fn exec(&self, host: &HostSpec, command: &str) -> AppResult<ExecOutput> {
        self.exec_streamed(host, command, None).await
    }

    pub async fn exec_streamed(
        &self,
        host: &HostSpec,
        command: &str,
        on_line: Option<LineSink>,
    ) -> AppResult<ExecOutput> {
        retry(self.policy, command, || {
            let sink = on_line.clone();
            async move { self.shell.exec(host, command, sink).await }
        })
        .await
        .map_err(AppError::remote)
    }

    /// Like [`exec`](Self::exec) but a non-zero exit is an error.
    pub async fn exec_ok(&self, host: &HostSpec, command: &str) -> AppResult<ExecOutput> {
        let output = self.exec(host, command).await?;
        if !output.success() {
            return Err(AppError::remote(RemoteError::CommandFailed {
                host: host.host.clone(),
                status: output.exit_code,
                stderr: output.stderr.trim().to_owned(),
            }));
        }
        Ok(output)
    }

    /// Uploads only when the remote copy differs (content hash compared
    /// first), so re-deploys after an unchanged setup are free.
    pub async fn upload_idempotent(
        &self,
        host: &HostSpec,
        local: &Path,
        remote: &str,
    ) -> AppResult<bool> {
        let local_hash = file_sha256(local)?;
        let probe = self
            .exec(
                host,
                &format!("sha256sum {remote} 2>/dev/null | cut -d' ' -f1"),
            )
            .await?;
        if probe.success() && probe.stdout.trim() == local_hash {
            debug!(host = %host.host, remote, "remote artifact up to date");
            return Ok(false);
        }
        retry(self.policy, remote, || async move {
            self.shell.upload(host, local, remote).await
        })
        .await
        .map_err(AppError::remote)?;
        Ok(true)
    }

    pub async fn download(&self, host: &HostSpec, remote: &str, local: &Path) -> AppResult<()> {
        retry(self.policy, remote, || async move {
            self.shell.download(host, remote, local).await
        })
        .await
        .map_err(AppError::remote)
    }

    /// Verifies the host answers on its SSH port within the retry budget.
    pub async fn ensure_connectivity(
        &self,
        host: &HostSpec,
        timeout: Duration,
    ) -> AppResult<()> {
        retry(self.policy, &host.host, || async move {
            self.shell.probe(host, timeout).await
        })
        .await
        .map_err(AppError::remote)
    }
}

pub(crate) fn file_sha256(path: &Path) -> AppResult<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}
