//! Task data model: references, commands, steps and the builder.
//!
//! A task is a linear list of named steps. Each step is either an external
//! [`Command`] or an in-process [`Func`], and declares the output keys later
//! steps may reference through a [`Ref`]. Declaration order is execution
//! order; nothing is ever reordered.

pub mod builder;
pub mod command;
pub mod step;
pub mod values;

pub use builder::{StepHandle, TaskBuilder, TaskScope};
pub use command::{Arg, Command};
pub use step::{Func, Runnable, Task, TaskStep, STDERR_KEY, STDOUT_KEY};
pub use values::{Inputs, Ref, Values};
