//! Snapshot of how the current process was launched.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable that switches a process into wrapper mode. Its value
/// is the path of the binary the process stands in for.
pub const INVOCATION_ENV: &str = "STEPFORGE_INVOCATION";

/// Argument vector, environment and executable path of a process.
///
/// The harness decides between wrapper and setup mode from this value alone,
/// so tests can construct one by hand instead of mutating global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    self_exe: PathBuf,
}

/// What a harness should do when started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Stand in for `path`, which was invoked with `args`.
    Wrapper { path: String, args: Vec<String> },
    /// Install wrappers and let the test proceed.
    Setup,
}

impl LaunchContext {
    pub fn new(args: Vec<String>, env: BTreeMap<String, String>, self_exe: impl Into<PathBuf>) -> Self {
        Self {
            args,
            env,
            self_exe: self_exe.into(),
        }
    }

    /// Captures the running process.
    pub fn current() -> io::Result<Self> {
        let lossy = |s: OsString| s.to_string_lossy().into_owned();
        Ok(Self {
            args: std::env::args_os().map(lossy).collect(),
            env: std::env::vars_os().map(|(k, v)| (lossy(k), lossy(v))).collect(),
            self_exe: std::env::current_exe()?,
        })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn self_exe(&self) -> &Path {
        &self.self_exe
    }

    /// The impersonated binary, if this process was started by a wrapper.
    pub fn invocation(&self) -> Option<&str> {
        self.env(INVOCATION_ENV).filter(|v| !v.is_empty())
    }

    /// Arguments meant for the impersonated binary.
    ///
    /// Wrappers put them after a `--` separator, following any test-runner
    /// arguments; without a separator everything after `argv[0]` is used.
    pub fn forwarded_args(&self) -> Vec<String> {
        let rest = self.args.get(1..).unwrap_or_default();
        match rest.iter().position(|a| a == "--") {
            Some(i) => rest[i + 1..].to_vec(),
            None => rest.to_vec(),
        }
    }

    pub fn mode(&self) -> Mode {
        match self.invocation() {
            Some(path) => Mode::Wrapper {
                path: path.to_string(),
                args: self.forwarded_args(),
            },
            None => Mode::Setup,
        }
    }

    /// Locates `program` the way a shell would, using this context's `PATH`.
    /// Programs containing a slash are returned as-is when they exist.
    pub fn lookup_program(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }

        let path_var = self.env("PATH")?;
        std::env::split_paths(path_var)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
