//! Steps, in-process functions and the frozen task.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::command::Command;
use super::values::{Ref, Values};
use crate::engine::StepContext;
use crate::error::DefineError;

/// Output key under which a command step records its standard output.
pub const STDOUT_KEY: &str = "stdout";
/// Output key declared for a command step's standard error.
pub const STDERR_KEY: &str = "stderr";

type FuncBody = Arc<dyn Fn(StepContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An in-process step body with a fixed set of declared outputs.
///
/// The body receives a [`StepContext`] and is expected to `set` every key in
/// `outputs` before returning.
#[derive(Clone)]
pub struct Func {
    name: String,
    outputs: Vec<String>,
    body: FuncBody,
}

impl Func {
    /// Creates a function step.
    ///
    /// `name` is used for the shell placeholders emitted by the script
    /// compiler (`${NAME_KEY}`), so it should be a shell-friendly identifier.
    pub fn new<O, S, F, Fut>(name: impl Into<String>, outputs: O, body: F) -> Self
    where
        O: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared output keys in declaration order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Environment-style name for one output, e.g. `GEN_YAMLPATH`.
    pub fn variable_name(&self, key: &str) -> String {
        format!("{}_{}", self.name.to_uppercase(), key.to_uppercase())
    }

    /// Shell placeholder for one output, e.g. `${GEN_YAMLPATH}`.
    pub fn placeholder(&self, key: &str) -> String {
        format!("${{{}}}", self.variable_name(key))
    }

    pub(crate) fn call(&self, ctx: StepContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// What a step does when it runs.
#[derive(Debug, Clone)]
pub enum Runnable {
    /// An external program.
    Command(Command),
    /// An in-process function.
    Func(Func),
}

impl Runnable {
    /// Keys the step declares: `stdout`/`stderr` for commands, the function's
    /// own outputs otherwise.
    pub fn output_keys(&self) -> Vec<String> {
        match self {
            Runnable::Command(_) => vec![STDOUT_KEY.to_string(), STDERR_KEY.to_string()],
            Runnable::Func(func) => func.outputs().to_vec(),
        }
    }
}

impl From<Command> for Runnable {
    fn from(command: Command) -> Self {
        Runnable::Command(command)
    }
}

impl From<Func> for Runnable {
    fn from(func: Func) -> Self {
        Runnable::Func(func)
    }
}

/// A named unit of work inside a [`Task`].
#[derive(Debug, Clone)]
pub struct TaskStep {
    name: String,
    runnable: Runnable,
    outputs: Values,
}

impl TaskStep {
    /// Creates a step and declares its outputs from the runnable kind.
    pub fn new(name: impl Into<String>, runnable: impl Into<Runnable>) -> Self {
        let name = name.into();
        let runnable = runnable.into();

        let mut outputs = Values::for_step(name.clone());
        for key in runnable.output_keys() {
            outputs.define(key);
        }

        Self {
            name,
            runnable,
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runnable(&self) -> &Runnable {
        &self.runnable
    }

    pub fn outputs(&self) -> &Values {
        &self.outputs
    }

    /// Reference to one of this step's declared outputs.
    pub fn get(&self, key: &str) -> Result<Ref, DefineError> {
        self.outputs.get(key)
    }
}

/// A frozen, ordered list of steps plus deferred cleanup steps.
///
/// Produced by [`TaskBuilder::build`](crate::task::TaskBuilder::build); the
/// declaration order is the execution order.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) steps: Vec<TaskStep>,
    pub(crate) cleanup: Vec<TaskStep>,
    pub(crate) inputs: Values,
}

impl Task {
    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    /// Deferred steps in declaration order. They are never run by
    /// [`run_task`](crate::engine::run_task).
    pub fn cleanup(&self) -> &[TaskStep] {
        &self.cleanup
    }

    /// Declared input keys.
    pub fn inputs(&self) -> &Values {
        &self.inputs
    }

    /// Looks a step up by name among the main steps, then the cleanup steps.
    pub fn find_step(&self, name: &str) -> Option<&TaskStep> {
        self.steps
            .iter()
            .chain(self.cleanup.iter())
            .find(|s| s.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_step_declares_streams() {
        let step = TaskStep::new("say hello", Command::new("bash").args(["-c", "echo hello"]));
        assert_eq!(
            step.outputs().keys().collect::<Vec<_>>(),
            vec![STDOUT_KEY, STDERR_KEY]
        );
        assert!(step.get("stdout").is_ok());
        assert!(step.get("yamlPath").is_err());
    }

    #[test]
    fn test_func_step_declares_exactly_its_outputs() {
        let func = Func::new("gen", ["yamlPath"], |_ctx| async { Ok(()) });
        let step = TaskStep::new("generate workflow", func);
        assert_eq!(step.outputs().keys().collect::<Vec<_>>(), vec!["yamlPath"]);
        assert!(step.get("stdout").is_err());
    }

    #[test]
    fn test_func_placeholder_is_upper_cased() {
        let func = Func::new("gen", ["yamlPath"], |_ctx| async { Ok(()) });
        assert_eq!(func.variable_name("yamlPath"), "GEN_YAMLPATH");
        assert_eq!(func.placeholder("yamlPath"), "${GEN_YAMLPATH}");
    }
}
