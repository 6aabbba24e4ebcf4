//! The construction-time API pipeline authors use to declare a task.
//!
//! ```
//! use stepforge::{cmd, TaskBuilder, TaskScope};
//!
//! let mut builder = TaskBuilder::new().with_input("seed");
//! let seed = builder.input("seed").unwrap();
//! builder.defer("stop cluster", cmd!("kind", "delete", "cluster", "--name", seed.clone()));
//! builder.step("start cluster", cmd!("kind", "create", "cluster", "--name", seed));
//!
//! let task = builder.build().unwrap();
//! assert_eq!(task.steps().len(), 1);
//! assert_eq!(task.cleanup().len(), 1);
//! ```

use std::collections::HashSet;

use super::command::{Arg, Command};
use super::step::{Runnable, Task, TaskStep};
use super::values::{Ref, Values};
use crate::error::DefineError;

/// Handle to a declared step, used to reference its outputs from later steps.
#[derive(Debug, Clone)]
pub struct StepHandle {
    outputs: Values,
}

impl StepHandle {
    /// Reference to a declared output of the step.
    pub fn get(&self, key: &str) -> Result<Ref, DefineError> {
        self.outputs.get(key)
    }

    /// Name of the step this handle points at.
    pub fn name(&self) -> &str {
        self.outputs.owner().unwrap_or_default()
    }
}

/// Operations available while defining a task.
pub trait TaskScope {
    /// Appends a step and returns a handle to its outputs.
    fn step(&mut self, name: &str, runnable: impl Into<Runnable>) -> StepHandle;

    /// Appends a cleanup step. Cleanup steps are never run automatically.
    fn defer(&mut self, name: &str, runnable: impl Into<Runnable>);

    /// Reference to a declared task input.
    fn input(&self, key: &str) -> Result<Ref, DefineError>;

    /// Convenience constructor for a command.
    fn cmd<I, A>(&self, path: &str, args: I) -> Command
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Command::new(path).args(args)
    }
}

/// Collects steps in declaration order and freezes them into a [`Task`].
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    steps: Vec<TaskStep>,
    cleanup: Vec<TaskStep>,
    inputs: Values,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a task input, builder style.
    pub fn with_input(mut self, key: impl Into<String>) -> Self {
        self.declare_input(key);
        self
    }

    /// Declares a task input.
    pub fn declare_input(&mut self, key: impl Into<String>) {
        self.inputs.define(key);
    }

    /// Freezes the declared steps into a [`Task`].
    ///
    /// Step names must be unique across main and cleanup steps, since
    /// references are resolved by name.
    pub fn build(self) -> Result<Task, DefineError> {
        let mut seen = HashSet::new();
        for step in self.steps.iter().chain(self.cleanup.iter()) {
            if !seen.insert(step.name()) {
                return Err(DefineError::DuplicateStep {
                    name: step.name().to_string(),
                });
            }
        }

        Ok(Task {
            steps: self.steps,
            cleanup: self.cleanup,
            inputs: self.inputs,
        })
    }
}

impl TaskScope for TaskBuilder {
    fn step(&mut self, name: &str, runnable: impl Into<Runnable>) -> StepHandle {
        let step = TaskStep::new(name, runnable);
        let handle = StepHandle {
            outputs: step.outputs().clone(),
        };
        self.steps.push(step);
        handle
    }

    fn defer(&mut self, name: &str, runnable: impl Into<Runnable>) {
        self.cleanup.push(TaskStep::new(name, runnable));
    }

    fn input(&self, key: &str) -> Result<Ref, DefineError> {
        self.inputs.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Func;

    #[test]
    fn test_steps_keep_declaration_order() {
        let mut b = TaskBuilder::new();
        b.step("one", Command::new("true"));
        b.step("two", Command::new("true"));
        b.step("three", Command::new("true"));
        let task = b.build().unwrap();

        let names: Vec<_> = task.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_handle_hands_out_declared_outputs_only() {
        let mut b = TaskBuilder::new();
        let gen = b.step(
            "generate workflow",
            Func::new("gen", ["yamlPath"], |_ctx| async { Ok(()) }),
        );

        assert_eq!(gen.name(), "generate workflow");
        let r = gen.get("yamlPath").unwrap();
        assert_eq!(r, Ref::output("generate workflow", "yamlPath"));
        assert!(matches!(
            gen.get("echoTest"),
            Err(DefineError::ValueNotDefined { .. })
        ));
    }

    #[test]
    fn test_undeclared_input_is_rejected() {
        let b = TaskBuilder::new().with_input("seed");
        assert!(b.input("seed").is_ok());
        assert_eq!(
            b.input("region").unwrap_err(),
            DefineError::ValueNotDefined {
                owner: None,
                key: "region".to_string(),
            }
        );
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let mut b = TaskBuilder::new();
        b.step("deploy", Command::new("true"));
        b.defer("deploy", Command::new("false"));
        assert_eq!(
            b.build().unwrap_err(),
            DefineError::DuplicateStep {
                name: "deploy".to_string()
            }
        );
    }

    #[test]
    fn test_scope_cmd_helper() {
        let b = TaskBuilder::new();
        let c = b.cmd("kubectl", ["apply", "-f", "testdata/"]);
        assert_eq!(c.to_string(), "kubectl apply -f testdata/");
    }
}
