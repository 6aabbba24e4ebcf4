//! The context handed to function steps.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::resolve::{resolve_args, resolve_ref};
use super::state::RunState;
use crate::error::{ContextError, ResolveError};
use crate::target::{CapturedOutput, Target};
use crate::task::{Arg, Command, Inputs, Ref};

/// Step-scoped view of a run, passed by value to a [`Func`](crate::task::Func) body.
///
/// Reads go through the same resolution rules as command arguments. Writes
/// land in a fresh output map that becomes the step's recorded state once the
/// body returns successfully. Cloning the context shares that output map.
#[derive(Clone)]
pub struct StepContext {
    step: String,
    target: Arc<dyn Target>,
    inputs: Arc<Inputs>,
    state: Arc<RunState>,
    outputs: Arc<Mutex<BTreeMap<String, String>>>,
}

impl StepContext {
    pub(crate) fn new(step: impl Into<String>, target: Arc<dyn Target>, inputs: Arc<Inputs>, state: Arc<RunState>) -> Self {
        Self {
            step: step.into(),
            target,
            inputs,
            state,
            outputs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Name of the step being executed.
    pub fn step_name(&self) -> &str {
        &self.step
    }

    /// Value of a task input.
    pub fn get(&self, key: &str) -> Result<String, ResolveError> {
        self.resolve(&Ref::input(key))
    }

    /// Resolves an input or an output of an earlier step.
    pub fn resolve(&self, r: &Ref) -> Result<String, ResolveError> {
        resolve_ref(&self.step, r, &self.inputs, &self.state)
    }

    /// Sets an output of the current step. Setting a key twice keeps the last value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock_outputs().insert(key.into(), value.into());
    }

    /// Starts building a sub-process call routed through the run's target.
    pub fn cmd(&self, path: impl Into<String>) -> StepCommand<'_> {
        StepCommand {
            ctx: self,
            command: Command::new(path),
        }
    }

    /// Runs `command` through the run's target and captures its output.
    ///
    /// The output is returned to the caller only; it is not copied to the
    /// target's sinks.
    pub async fn exec(&self, command: &Command) -> Result<CapturedOutput, ContextError> {
        let args = resolve_args(&self.step, command, &self.inputs, &self.state)?;
        let result = self.target.execute(command, &args).await?;
        Ok(result.read_all().await?)
    }

    /// Outputs set so far.
    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.lock_outputs().clone()
    }

    fn lock_outputs(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.outputs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("step", &self.step)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// A sub-process call being assembled inside a function step.
pub struct StepCommand<'a> {
    ctx: &'a StepContext,
    command: Command,
}

impl StepCommand<'_> {
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.command = self.command.arg(arg);
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.command = self.command.args(args);
        self
    }

    pub async fn exec(self) -> Result<CapturedOutput, ContextError> {
        self.ctx.exec(&self.command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::RecordingTarget;

    fn context(target: Arc<dyn Target>) -> StepContext {
        let inputs = Inputs::new().with("seed", "abc");
        let mut state = RunState::new();
        state.record(
            "start cluster",
            BTreeMap::from([("stdout".to_string(), "created\n".to_string())]),
        );
        StepContext::new("generate workflow", target, Arc::new(inputs), Arc::new(state))
    }

    #[test]
    fn test_get_and_resolve() {
        let ctx = context(Arc::new(RecordingTarget::new()));
        assert_eq!(ctx.get("seed").unwrap(), "abc");
        assert!(matches!(ctx.get("region"), Err(ResolveError::MissingInput { .. })));
        assert_eq!(
            ctx.resolve(&Ref::output("start cluster", "stdout")).unwrap(),
            "created\n"
        );
    }

    #[test]
    fn test_set_is_shared_between_clones() {
        let ctx = context(Arc::new(RecordingTarget::new()));
        let other = ctx.clone();
        other.set("yamlPath", "a.yaml");
        ctx.set("yamlPath", "b.yaml");
        assert_eq!(ctx.outputs().get("yamlPath").map(String::as_str), Some("b.yaml"));
    }

    #[tokio::test]
    async fn test_exec_routes_through_target() {
        let target = RecordingTarget::new();
        let ctx = context(Arc::new(target.clone()));

        let out = ctx
            .cmd("bash")
            .args(["-c", "echo test"])
            .exec()
            .await
            .unwrap();
        assert_eq!(out, CapturedOutput::default());

        let c = Command::new("echo").arg(Ref::input("seed"));
        ctx.exec(&c).await.unwrap();

        let recorded = target.invocations();
        assert_eq!(recorded[0].command_line(), "bash -c echo test");
        assert_eq!(recorded[1].command_line(), "echo abc");
    }
}
