use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Transient failure reaching {host}: {message}")]
    Transient { host: String, message: String },
    #[error("Gave up on {host} after {attempts} attempts: {message}")]
    AttemptsExhausted {
        host: String,
        attempts: u32,
        message: String,
    },
    #[error("Command on {host} exited with status {status}: {stderr}")]
    CommandFailed {
        host: String,
        status: i32,
        stderr: String,
    },
    #[error("Timed out after {secs}s waiting for {label}.")]
    Timeout { label: String, secs: u64 },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("File transfer to {host} failed for {path}: {message}")]
    Transfer {
        host: String,
        path: String,
        message: String,
    },
}

impl RemoteError {
    /// Transient errors are retried by the executor; everything else
    /// surfaces on the first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }
}
