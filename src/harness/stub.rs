//! Expected invocations and the context their handlers run in.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use crate::task::Command;

type StubHandler = Arc<dyn Fn(&mut RunContext) -> io::Result<()> + Send + Sync>;

/// An expected command paired with the behavior that simulates it.
///
/// A stub matches an invocation only when the path is identical and the
/// resolved argument list is equal element by element.
#[derive(Clone)]
pub struct ExecutionStub {
    command: Command,
    handler: StubHandler,
}

impl ExecutionStub {
    pub fn new<F>(command: Command, handler: F) -> Self
    where
        F: Fn(&mut RunContext) -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            command,
            handler: Arc::new(handler),
        }
    }

    /// A stub that prints `output` on stdout and exits successfully.
    pub fn with_output(command: Command, output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new(command, move |ctx| ctx.stdout.write_all(output.as_bytes()))
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Base name of the impersonated binary.
    pub fn binary(&self) -> &str {
        self.command.program_name()
    }

    pub fn matches(&self, path: &str, args: &[String]) -> bool {
        self.command.path() == path && self.command.rendered_args() == args
    }

    pub(crate) fn run(&self, ctx: &mut RunContext) -> io::Result<()> {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for ExecutionStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStub")
            .field("command", &self.command.to_string())
            .finish_non_exhaustive()
    }
}

/// Handed to a stub handler while it impersonates a binary.
pub struct RunContext {
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
    exit_code: Option<i32>,
}

impl RunContext {
    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit_code: None,
        }
    }

    /// Context for a process started by a wrapper: stdout goes to fd 3,
    /// which the wrapper points at the caller's stdout.
    pub fn inherited() -> Self {
        let stdout: Box<dyn Write + Send> = match std::fs::OpenOptions::new().write(true).open("/dev/fd/3") {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::stdout()),
        };
        Self {
            stdout,
            stderr: Box::new(io::stderr()),
            exit_code: None,
        }
    }

    /// Sets the exit status of the impersonated binary.
    ///
    /// The process exits once the handler returns; the last call wins.
    pub fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Renders an unexpected invocation as an expectation the caller can paste.
pub trait CommandPrinter: Send + Sync {
    fn print(&self, path: &str, args: &[String]) -> String;
}

/// Prints an `ExecutionStub::new(cmd!(..), ..)` expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroCommandPrinter;

impl CommandPrinter for MacroCommandPrinter {
    fn print(&self, path: &str, args: &[String]) -> String {
        let quoted: Vec<String> = std::iter::once(path)
            .chain(args.iter().map(String::as_str))
            .map(|s| format!("{:?}", s))
            .collect();

        format!(
            "ExecutionStub::new(cmd!({}), |ctx| {{\n    writeln!(ctx.stdout, \"{} succeeded.\")\n}})",
            quoted.join(", "),
            Command::new(path).program_name()
        )
    }
}
