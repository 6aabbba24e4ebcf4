//! stepforge: linear step pipelines with interchangeable backends.
//!
//! A task is an ordered list of named steps, each either an external command
//! or an in-process function. The same task can be run for real, run against
//! a command-intercepting test harness, or compiled into a bash script.

// Core modules
pub mod cli;
pub mod demo;
pub mod engine;
pub mod error;
pub mod harness;
pub mod script;
pub mod target;
pub mod task;

// Re-export commonly used types
pub use engine::{run_cleanup, run_step, run_task, RunState, StepContext};
pub use error::{
    CompileError, ContextError, DefineError, ExitError, HarnessError, ResolveError, RunError,
    StreamError, TargetError,
};
pub use harness::{ExecutionStub, Harness, LaunchContext, RunContext};
pub use script::{compile_script, write_script, ScriptOptions};
pub use target::{ProcessTarget, RecordingTarget, Target};
pub use task::{Command, Func, Inputs, Ref, Task, TaskBuilder, TaskScope};
