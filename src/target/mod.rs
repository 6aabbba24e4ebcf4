//! Execution targets.
//!
//! A [`Target`] is the system a task interacts with. It executes a command
//! whose arguments have already been resolved and exposes the sinks the
//! engine tees each command's output into.
//!
//! Implementations:
//! - [`ProcessTarget`]: runs real processes
//! - [`RecordingTarget`]: records invocations without running anything
//! - [`Harness`](crate::harness::Harness): matches invocations against stubs
//!   and loops them back into the owning test process

pub mod process;
pub mod recording;
pub mod sink;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::TargetError;
use crate::task::Command;

pub use process::{run_command, ProcessTarget, LOG_PREFIX};
pub use recording::{Invocation, RecordingTarget};
pub use sink::{OutputSink, SharedBuffer};

/// Boxed reader over one output stream of a command.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed writer for a target's output sink.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The two output streams of an executed command.
pub struct ExecResult {
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
}

impl ExecResult {
    /// Wraps already captured output.
    pub fn from_bytes(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            stdout: Box::new(std::io::Cursor::new(stdout)),
            stderr: Box::new(std::io::Cursor::new(stderr)),
        }
    }

    /// A result with no output on either stream.
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new(), Vec::new())
    }

    /// Reads both streams to the end.
    pub async fn read_all(mut self) -> std::io::Result<CapturedOutput> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        self.stdout.read_to_end(&mut stdout).await?;
        self.stderr.read_to_end(&mut stderr).await?;

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl std::fmt::Debug for ExecResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecResult").finish_non_exhaustive()
    }
}

/// Fully captured output of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The system a task is run against.
#[async_trait]
pub trait Target: Send + Sync {
    /// Executes `command` with its arguments already resolved to `args`.
    async fn execute(&self, command: &Command, args: &[String]) -> Result<ExecResult, TargetError>;

    /// Sink receiving every command's standard output.
    fn stdout(&self) -> BoxedWriter;

    /// Sink receiving every command's standard error.
    fn stderr(&self) -> BoxedWriter;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_result_read_all() {
        let res = ExecResult::from_bytes(b"out\n".to_vec(), b"err\n".to_vec());
        let captured = res.read_all().await.unwrap();
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");

        let empty = ExecResult::empty().read_all().await.unwrap();
        assert_eq!(empty, CapturedOutput::default());
    }
}
