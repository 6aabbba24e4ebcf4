//! Command-interception test harness.
//!
//! [`Harness`] is a [`Target`] that only lets a task run the commands a test
//! expects. Each expected command is an [`ExecutionStub`]. When started in a
//! test, the harness writes one small bash wrapper per stubbed binary into a
//! scratch directory. Executing a stubbed command runs that wrapper with
//! `PATH` pointing at the scratch directory, and the wrapper re-invokes the
//! test binary itself with [`INVOCATION_ENV`] set. The re-invoked test calls
//! [`Harness::start`] again, which now finds the marker, runs the matching
//! stub handler and exits. Scripts run through the harness therefore reach
//! the stubs even when they call a binary by bare name.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stepforge::harness::{ExecutionStub, Harness};
//! use stepforge::{cmd, run_task, Inputs, TaskBuilder, TaskScope};
//!
//! # async fn deploys_chart() -> anyhow::Result<()> {
//! let mut harness = Harness::for_current_test()?
//!     .with_stub(ExecutionStub::with_output(cmd!("helm", "upgrade", "--install", "nginx"), "ok\n"));
//! harness.start()?;
//!
//! let mut b = TaskBuilder::new();
//! b.step("deploy", cmd!("helm", "upgrade", "--install", "nginx"));
//! let state = run_task(&b.build()?, Arc::new(harness), &Inputs::new()).await?;
//! assert_eq!(state.get("deploy", "stdout"), Some("ok\n"));
//! # Ok(())
//! # }
//! ```
//!
//! Stub handlers must be registered identically in the first test run and
//! in the re-invoked one, since the re-invoked process rebuilds the harness
//! from scratch.

pub mod launch;
pub mod shim;
pub mod stub;

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{HarnessError, TargetError};
use crate::target::process::{diagnose, run_command};
use crate::target::{BoxedWriter, ExecResult, OutputSink, Target};
use crate::task::Command;

pub use launch::{LaunchContext, Mode, INVOCATION_ENV};
pub use shim::{shell_quote, wrapper_script, write_wrapper};
pub use stub::{CommandPrinter, ExecutionStub, MacroCommandPrinter, RunContext};

/// A [`Target`] that matches invocations against stubs.
pub struct Harness {
    launch: LaunchContext,
    stubs: Vec<ExecutionStub>,
    allow_by_default: bool,
    allowed: HashSet<String>,
    test_name: Option<String>,
    printer: Arc<dyn CommandPrinter>,
    stdout: OutputSink,
    stderr: OutputSink,
    bin_dir: Option<PathBuf>,
    scratch: Option<TempDir>,
}

impl Harness {
    /// Creates a harness for a process launched as described by `launch`.
    pub fn new(launch: LaunchContext) -> Self {
        Self {
            launch,
            stubs: Vec::new(),
            allow_by_default: false,
            allowed: HashSet::new(),
            test_name: None,
            printer: Arc::new(MacroCommandPrinter),
            stdout: OutputSink::Stdout,
            stderr: OutputSink::Stderr,
            bin_dir: None,
            scratch: None,
        }
    }

    /// Creates a harness for the running test.
    ///
    /// The test name is taken from the current thread, which the test runner
    /// names after the test. Wrappers then re-run only that test. Under
    /// `--test-threads=1` tests run on the main thread and no filter is used.
    pub fn for_current_test() -> Result<Self, HarnessError> {
        let harness = Self::new(LaunchContext::current()?);
        Ok(match std::thread::current().name() {
            Some(name) if name != "main" => harness.with_test_name(name),
            _ => harness,
        })
    }

    /// Registers an expected invocation.
    pub fn with_stub(mut self, stub: ExecutionStub) -> Self {
        self.stubs.push(stub);
        self
    }

    /// Lets the binary with the given base name run for real.
    pub fn allow(mut self, binary: impl Into<String>) -> Self {
        self.allowed.insert(binary.into());
        self
    }

    /// Lets every unstubbed binary run for real.
    pub fn allow_by_default(mut self, allow: bool) -> Self {
        self.allow_by_default = allow;
        self
    }

    /// Restricts re-invocations to the named test.
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Writes wrappers into `dir` instead of a fresh temporary directory.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn with_printer(mut self, printer: impl CommandPrinter + 'static) -> Self {
        self.printer = Arc::new(printer);
        self
    }

    pub fn with_stdout(mut self, sink: impl Into<OutputSink>) -> Self {
        self.stdout = sink.into();
        self
    }

    pub fn with_stderr(mut self, sink: impl Into<OutputSink>) -> Self {
        self.stderr = sink.into();
        self
    }

    pub fn stubs(&self) -> &[ExecutionStub] {
        &self.stubs
    }

    /// Directory holding the wrappers, once started.
    pub fn bin_dir(&self) -> Option<&Path> {
        self.scratch
            .as_ref()
            .map(TempDir::path)
            .or(self.bin_dir.as_deref())
    }

    /// Starts the harness.
    ///
    /// In a process launched by a wrapper, this runs the matching stub and
    /// exits the process with the stub's status; it never returns. Otherwise
    /// it installs the wrappers and returns.
    pub fn start(&mut self) -> Result<(), HarnessError> {
        match self.launch.mode() {
            Mode::Wrapper { path, args } => {
                let mut ctx = RunContext::inherited();
                let code = self.serve(&path, &args, &mut ctx);
                std::process::exit(code)
            }
            Mode::Setup => self.install_wrappers(),
        }
    }

    /// Impersonates `path` invoked with `args` and returns the exit status.
    pub fn serve(&self, path: &str, args: &[String], ctx: &mut RunContext) -> i32 {
        let Some(stub) = self.find_expected(path, args) else {
            let known: Vec<String> = self.stubs.iter().map(|s| s.command().to_string()).collect();
            let _ = writeln!(
                ctx.stderr,
                "Path {} args {:?} is not expected; known stubs: {:?}",
                path, args, known
            );
            return 1;
        };

        let status = match stub.run(ctx) {
            Ok(()) => ctx.exit_code().unwrap_or(0),
            Err(e) => {
                let _ = writeln!(ctx.stderr, "stub for {} failed: {}", path, e);
                1
            }
        };
        let _ = ctx.stdout.flush();
        status
    }

    /// Writes one wrapper per stubbed binary.
    pub fn install_wrappers(&mut self) -> Result<(), HarnessError> {
        let dir = match &self.bin_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => {
                let scratch = tempfile::Builder::new().prefix("stepforge-bin-").tempdir()?;
                let dir = scratch.path().to_path_buf();
                self.scratch = Some(scratch);
                dir
            }
        };

        let mut wrappers: HashMap<&str, &str> = HashMap::new();
        for (index, stub) in self.stubs.iter().enumerate() {
            let path = stub.command().path();
            if path.is_empty() {
                return Err(HarnessError::EmptyStubPath {
                    index,
                    command: stub.command().to_string(),
                });
            }
            match wrappers.insert(stub.binary(), path) {
                Some(first) if first != path => {
                    return Err(HarnessError::ConflictingStubs {
                        binary: stub.binary().to_string(),
                        first: first.to_string(),
                        second: path.to_string(),
                    });
                }
                _ => {}
            }
        }

        if !self.stubs.is_empty() {
            let bash = self.launch.lookup_program("bash").ok_or(HarnessError::BashNotFound)?;
            for stub in &self.stubs {
                let script = wrapper_script(
                    &bash,
                    stub.command().path(),
                    self.launch.self_exe(),
                    self.test_name.as_deref(),
                );
                let path = write_wrapper(&dir, stub.binary(), &script)?;
                debug!(wrapper = %path.display(), "Installed wrapper");
            }
        }

        info!(dir = %dir.display(), stubs = self.stubs.len(), "Harness started");
        self.bin_dir = Some(dir);
        Ok(())
    }

    /// The first stub expecting exactly `path` with `args`.
    pub fn find_expected(&self, path: &str, args: &[String]) -> Option<&ExecutionStub> {
        self.stubs.iter().find(|s| s.matches(path, args))
    }

    fn is_allowed(&self, command: &Command) -> bool {
        self.allow_by_default || self.allowed.contains(command.program_name())
    }

    fn restricted_path(&self) -> String {
        self.bin_dir()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("stubs", &self.stubs)
            .field("allow_by_default", &self.allow_by_default)
            .field("allowed", &self.allowed)
            .field("test_name", &self.test_name)
            .field("bin_dir", &self.bin_dir())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Target for Harness {
    async fn execute(&self, command: &Command, args: &[String]) -> Result<ExecResult, TargetError> {
        if let Some(stub) = self.find_expected(command.path(), args) {
            let bin_dir = self.bin_dir().ok_or(HarnessError::NotStarted)?;
            let wrapper = bin_dir.join(stub.binary());
            debug!(command = %command, "Dispatching to stub");

            let mut cmd = tokio::process::Command::new(&wrapper);
            cmd.args(args)
                .env_clear()
                .env("PATH", bin_dir)
                .env(INVOCATION_ENV, command.path());
            let invoked_by = wrapper.to_string_lossy().into_owned();
            return run_command(cmd).await.map_err(|e| diagnose(e, &invoked_by));
        }

        if self.is_allowed(command) {
            debug!(command = %command, "Running allowed command");
            let program = self
                .launch
                .lookup_program(command.path())
                .ok_or_else(|| TargetError::ExecutableNotFound {
                    path: command.path().to_string(),
                })?;

            let mut cmd = tokio::process::Command::new(&program);
            cmd.args(args).env_clear().env("PATH", self.restricted_path());
            return run_command(cmd).await.map_err(|e| diagnose(e, command.path()));
        }

        let rendered = std::iter::once(command.path())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Err(TargetError::UnexpectedCommand {
            rendered,
            expectation: self.printer.print(command.path(), args),
        })
    }

    fn stdout(&self) -> BoxedWriter {
        self.stdout.writer()
    }

    fn stderr(&self) -> BoxedWriter {
        self.stderr.writer()
    }
}
