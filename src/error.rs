//! Error types for stepforge operations.
//!
//! Errors are grouped by the phase in which they surface:
//! - Definition (building a task with the builder)
//! - Resolution (turning references into concrete strings)
//! - Execution (spawning commands through a target)
//! - Stream copying (tee-ing command output to the target sinks)
//! - Harness setup (writing re-exec shims)
//! - Script compilation
//!
//! Every run-time error is terminal for the run it occurs in: there is no
//! retry and no partial resume.

use std::io;

use thiserror::Error;

use crate::target::LOG_PREFIX;

/// Errors raised while a task is being defined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefineError {
    /// An output or input key was referenced before being declared.
    #[error("{} does not have {key:?} defined", describe_owner(.owner))]
    ValueNotDefined { owner: Option<String>, key: String },

    /// Two steps share a name, which would make references ambiguous.
    #[error("step name {name:?} is declared more than once")]
    DuplicateStep { name: String },
}

fn describe_owner(owner: &Option<String>) -> String {
    match owner {
        Some(step) => format!("step {:?}", step),
        None => "task input list".to_string(),
    }
}

/// Errors raised while resolving a [`Ref`](crate::task::Ref) for a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("step {step:?}: no input provided for key {key:?}")]
    MissingInput { step: String, key: String },

    #[error("step {step:?}: depends on {key:?} of {producer:?} but {producer:?} is not yet executed")]
    ProducerNotRun {
        step: String,
        producer: String,
        key: String,
    },

    #[error("step {step:?}: step {producer:?} does not have output named {key:?}")]
    MissingOutput {
        step: String,
        producer: String,
        key: String,
    },
}

/// A command that ran to completion but exited unsuccessfully.
///
/// The rendered message tags the exit code and the combined output with
/// [`LOG_PREFIX`] so callers can scrape them line by line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ExitError {
    /// Program that was launched.
    pub program: String,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Interleaved stdout and stderr of the process.
    pub combined_output: String,
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} exited unsuccessfully", self.program)?;
        writeln!(f, "{} exit code: {}", LOG_PREFIX, self.code.unwrap_or(-1))?;
        write!(f, "{} combined output: {}", LOG_PREFIX, self.combined_output)
    }
}

/// Errors raised by a [`Target`](crate::target::Target) while executing a command.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error("failed to read output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The harness has neither a stub nor an allow-list entry for the command.
    #[error("command {rendered} is not expected for execution. Add the below as expectation:\n{expectation}\n")]
    UnexpectedCommand {
        rendered: String,
        expectation: String,
    },

    /// A shell launched by the target could not find a binary it invoked.
    #[error(
        "{binary:?} executed by {invoked_by:?} is not found in $PATH - this might be an unexpected execution or typo. \
         Either add an expectation for {binary:?} to the test harness, or fix the typo in {binary:?}"
    )]
    BinaryNotFound { binary: String, invoked_by: String },

    /// The target itself could not find the executable it was asked to run.
    #[error(
        "executable file {path:?} is not found in $PATH - this might be an unexpected execution or typo. \
         Either add an expectation for {path:?} to the test harness, or fix the typo in {path:?}"
    )]
    ExecutableNotFound { path: String },

    #[error("harness error: {0}")]
    Harness(#[from] HarnessError),
}

/// Which of the two output streams of a command an error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Errors raised while copying a command's output to the target sinks.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{stream}: {source}")]
    Io {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    #[error("{stream}: copy task panicked: {message}")]
    Panicked { stream: StreamKind, message: String },
}

/// Errors raised while setting up or serving the command-interception harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("bug: empty command path in stub at {index}: {command}")]
    EmptyStubPath { index: usize, command: String },

    /// Two stubs impersonate different paths sharing one base name, which
    /// would need two wrappers at the same location.
    #[error("stubs for {first:?} and {second:?} both need a wrapper named {binary:?}")]
    ConflictingStubs {
        binary: String,
        first: String,
        second: String,
    },

    #[error("bash not found in PATH; it is required to run harness wrappers")]
    BashNotFound,

    #[error("harness has not been started; call Harness::start before executing stubbed commands")]
    NotStarted,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by sub-process calls made from inside a function step.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The single terminal failure of a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("step {step:?}: {source}")]
    Execution {
        step: String,
        #[source]
        source: TargetError,
    },

    #[error("step {step:?}: {source}")]
    Stream {
        step: String,
        #[source]
        source: StreamError,
    },

    #[error("step {step:?}: {source:#}")]
    Func {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("step {step:?}: unhandled error: {message}")]
    Panicked { step: String, message: String },
}

impl RunError {
    /// Name of the step the run stopped at.
    pub fn step(&self) -> &str {
        match self {
            RunError::Resolve(ResolveError::MissingInput { step, .. })
            | RunError::Resolve(ResolveError::ProducerNotRun { step, .. })
            | RunError::Resolve(ResolveError::MissingOutput { step, .. })
            | RunError::Execution { step, .. }
            | RunError::Stream { step, .. }
            | RunError::Func { step, .. }
            | RunError::Panicked { step, .. } => step,
        }
    }
}

/// Errors raised while compiling a task into a shell script.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
