//! Dry-run target.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{BoxedWriter, ExecResult, SharedBuffer, Target};
use crate::error::TargetError;
use crate::task::Command;

/// One command a [`RecordingTarget`] was asked to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub path: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The invocation as a single line, `path arg1 arg2 ...`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.path.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A target that records every invocation and produces no output.
#[derive(Debug, Clone, Default)]
pub struct RecordingTarget {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations recorded so far, in execution order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Everything the engine copied to this target's stdout.
    pub fn stdout_buffer(&self) -> &SharedBuffer {
        &self.stdout
    }

    pub fn stderr_buffer(&self) -> &SharedBuffer {
        &self.stderr
    }
}

#[async_trait]
impl Target for RecordingTarget {
    async fn execute(&self, command: &Command, args: &[String]) -> Result<ExecResult, TargetError> {
        let invocation = Invocation {
            path: command.path().to_string(),
            args: args.to_vec(),
        };
        debug!("Recording {}", invocation.command_line());
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation);

        Ok(ExecResult::empty())
    }

    fn stdout(&self) -> BoxedWriter {
        Box::new(self.stdout.clone())
    }

    fn stderr(&self) -> BoxedWriter {
        Box::new(self.stderr.clone())
    }
}
