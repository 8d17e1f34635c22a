//! Remote execution: a uniform shell/file-transfer API over agent and
//! target hosts. The transport is the `RemoteShell` seam; the `Executor`
//! layers retry, connectivity checks and idempotent uploads on top.
mod executor;
mod retry;
mod shell;

pub use executor::Executor;
pub(crate) use executor::file_sha256;
pub use retry::{retry, wait_for, RetryPolicy};
pub use shell::{ExecOutput, HostSpec, LineSink, OpenSsh, RemoteShell};
