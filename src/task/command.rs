//! External command invocations with lazily resolved arguments.

use std::fmt;
use std::path::Path;

use super::values::Ref;

/// One argument of a [`Command`]: either a literal string or a reference that
/// is resolved when the command runs or is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    Ref(Ref),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Literal(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Literal(s.clone())
    }
}

impl From<Ref> for Arg {
    fn from(r: Ref) -> Self {
        Arg::Ref(r)
    }
}

impl From<&Ref> for Arg {
    fn from(r: &Ref) -> Self {
        Arg::Ref(r.clone())
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Literal(s) => write!(f, "{}", s),
            Arg::Ref(r) => write!(f, "{{{}}}", r),
        }
    }
}

/// An external program and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    args: Vec<Arg>,
}

impl Command {
    /// Creates a command with no arguments.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments of the same kind.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get_args(&self) -> &[Arg] {
        &self.args
    }

    /// Base name of the program, e.g. `kubectl` for `/usr/local/bin/kubectl`.
    pub fn program_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }

    /// Arguments rendered without resolution. References render as `{step.key}`.
    pub fn rendered_args(&self) -> Vec<String> {
        self.args.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Builds a [`Command`] from a path and a mixed list of literals and [`Ref`]s.
///
/// ```
/// use stepforge::{cmd, Ref};
///
/// let seed = Ref::input("seed");
/// let create = cmd!("kind", "create", "cluster", "--name", seed);
/// assert_eq!(create.to_string(), "kind create cluster --name {inputs.seed}");
/// ```
#[macro_export]
macro_rules! cmd {
    ($path:expr $(, $arg:expr)* $(,)?) => {
        $crate::task::Command::new($path)$(.arg($arg))*
    };
}
