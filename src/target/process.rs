//! Process runner and the process-backed target.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinError;
use tracing::debug;

use super::{BoxedWriter, ExecResult, OutputSink, SharedBuffer, Target};
use crate::error::{ExitError, TargetError};
use crate::task::Command;

/// Prefix tagging exit-code and combined-output lines in [`ExitError`]
/// messages, so log scrapers can find them line by line.
pub const LOG_PREFIX: &str = "StepforgeInvocation";

/// Size of the read buffer used when draining a child's pipes.
const CHUNK_SIZE: usize = 8192;

/// Matches shell diagnostics for a binary missing from `$PATH`, e.g.
/// `bash: line 1: helmx: command not found`,
/// `exec: "helmx": executable file not found in $PATH` or dash's
/// `sh: 1: helmx: not found`. The bare `not found` form is only accepted
/// behind a shell prefix, since many tools end their own errors with it.
static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?m)(?:(?:^|: )"?([^":\s]+)"?: (?:command not found|executable file not found in \$PATH)\s*$)"#,
        r#"|(?:^(?:\S*/)?(?:ba|da)?sh: (?:line )?\d+: ([^":\s]+): not found\s*$)"#,
    ))
    .expect("Invalid regex for missing binaries")
});

/// Runs a prepared command to completion.
///
/// Standard output and standard error are drained concurrently into their own
/// buffers while also being appended, in arrival order, to one combined
/// buffer. A non-zero exit yields [`TargetError::Exit`] carrying the exit code
/// and the combined output.
pub async fn run_command(mut command: tokio::process::Command) -> Result<ExecResult, TargetError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Spawning {}", program);
    let mut child = command.spawn().map_err(|source| TargetError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| pipe_missing(&program, "stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| pipe_missing(&program, "stderr"))?;

    let combined = SharedBuffer::new();
    let stdout_task = tokio::spawn(drain(stdout, combined.clone()));
    let stderr_task = tokio::spawn(drain(stderr, combined.clone()));

    let status = child.wait().await.map_err(|source| TargetError::Io {
        program: program.clone(),
        source,
    })?;

    let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
    let stdout = joined(&program, stdout)?;
    let stderr = joined(&program, stderr)?;

    if !status.success() {
        debug!("{} exited with {}", program, status);
        return Err(ExitError {
            program,
            code: status.code(),
            combined_output: combined.contents(),
        }
        .into());
    }

    Ok(ExecResult::from_bytes(stdout, stderr))
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, combined: SharedBuffer) -> io::Result<Vec<u8>> {
    let mut own = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        own.extend_from_slice(&chunk[..n]);
        combined.append(&chunk[..n]);
    }
    Ok(own)
}

fn pipe_missing(program: &str, stream: &str) -> TargetError {
    TargetError::Io {
        program: program.to_string(),
        source: io::Error::other(format!("{} was not captured", stream)),
    }
}

fn joined(program: &str, res: Result<io::Result<Vec<u8>>, JoinError>) -> Result<Vec<u8>, TargetError> {
    match res {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(source)) => Err(TargetError::Io {
            program: program.to_string(),
            source,
        }),
        Err(e) => Err(TargetError::Io {
            program: program.to_string(),
            source: io::Error::other(e.to_string()),
        }),
    }
}

/// Translates "binary missing" failures into an actionable diagnostic.
///
/// A shell launched as `invoked_by` that reports `<name>: command not found`
/// becomes [`TargetError::BinaryNotFound`]; a spawn that fails because the
/// executable itself is missing becomes [`TargetError::ExecutableNotFound`].
/// Anything else is returned unchanged.
pub fn diagnose(err: TargetError, invoked_by: &str) -> TargetError {
    match err {
        TargetError::Exit(exit) => match missing_binary(&exit.combined_output) {
            Some(binary) => TargetError::BinaryNotFound {
                binary,
                invoked_by: invoked_by.to_string(),
            },
            None => TargetError::Exit(exit),
        },
        TargetError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            TargetError::ExecutableNotFound {
                path: invoked_by.to_string(),
            }
        }
        other => other,
    }
}

/// Name of the first binary a shell reported as missing in `output`.
pub fn missing_binary(output: &str) -> Option<String> {
    NOT_FOUND
        .captures(output)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

/// A target that runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessTarget {
    stdout: OutputSink,
    stderr: OutputSink,
    env: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl ProcessTarget {
    /// Creates a target that forwards output to this process's stdout/stderr.
    pub fn new() -> Self {
        Self {
            stdout: OutputSink::Stdout,
            stderr: OutputSink::Stderr,
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_stdout(mut self, sink: impl Into<OutputSink>) -> Self {
        self.stdout = sink.into();
        self
    }

    pub fn with_stderr(mut self, sink: impl Into<OutputSink>) -> Self {
        self.stderr = sink.into();
        self
    }

    /// Adds an environment variable for every spawned command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory for every spawned command.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Default for ProcessTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Target for ProcessTarget {
    async fn execute(&self, command: &Command, args: &[String]) -> Result<ExecResult, TargetError> {
        let mut cmd = tokio::process::Command::new(command.path());
        cmd.args(args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        run_command(cmd).await.map_err(|e| diagnose(e, command.path()))
    }

    fn stdout(&self) -> BoxedWriter {
        self.stdout.writer()
    }

    fn stderr(&self) -> BoxedWriter {
        self.stderr.writer()
    }
}
