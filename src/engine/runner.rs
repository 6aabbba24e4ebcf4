//! Sequential task interpreter.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use super::context::StepContext;
use super::resolve::resolve_args;
use super::state::RunState;
use super::stream::copy_streams;
use crate::error::{panic_message, RunError};
use crate::target::Target;
use crate::task::{Command, Func, Inputs, Runnable, Task, TaskStep, STDOUT_KEY};

/// Runs every main step of `task` in declaration order against `target`.
///
/// Stops at the first failing step and returns its error; the outputs of
/// steps that already completed are discarded with it. Cleanup steps are not
/// run, see [`run_cleanup`].
pub async fn run_task(task: &Task, target: Arc<dyn Target>, inputs: &Inputs) -> Result<RunState, RunError> {
    let inputs = Arc::new(inputs.clone());
    let mut state = RunState::new();

    info!(steps = task.steps().len(), "Running task");
    for step in task.steps() {
        execute_step(step, &target, &inputs, &mut state).await?;
    }
    info!(steps = state.len(), "Task completed");

    Ok(state)
}

/// Runs a single step against `target`, recording its outputs into `state`.
///
/// `state` must already hold the outputs of every step the given step
/// references.
pub async fn run_step(
    step: &TaskStep,
    target: Arc<dyn Target>,
    inputs: &Inputs,
    state: &mut RunState,
) -> Result<(), RunError> {
    let inputs = Arc::new(inputs.clone());
    execute_step(step, &target, &inputs, state).await
}

/// Runs the cleanup steps of `task` in reverse declaration order.
///
/// Every cleanup step is attempted even if an earlier one fails, so that
/// resources acquired late are released first and none are skipped. The
/// first error is returned once all steps have been tried.
pub async fn run_cleanup(
    task: &Task,
    target: Arc<dyn Target>,
    inputs: &Inputs,
    state: &RunState,
) -> Result<(), RunError> {
    let inputs = Arc::new(inputs.clone());
    let mut state = state.clone();
    let mut first_error = None;

    for step in task.cleanup().iter().rev() {
        if let Err(e) = execute_step(step, &target, &inputs, &mut state).await {
            warn!(step = %step.name(), error = %e, "Cleanup step failed");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn execute_step(
    step: &TaskStep,
    target: &Arc<dyn Target>,
    inputs: &Arc<Inputs>,
    state: &mut RunState,
) -> Result<(), RunError> {
    info!(step = %step.name(), "Running step");

    let outputs = match step.runnable() {
        Runnable::Command(command) => run_command_step(step.name(), command, target, inputs, state).await?,
        Runnable::Func(func) => run_func_step(step.name(), func, target, inputs, state).await?,
    };

    debug!(step = %step.name(), outputs = ?outputs.keys().collect::<Vec<_>>(), "Step completed");
    state.record(step.name(), outputs);
    Ok(())
}

async fn run_command_step(
    name: &str,
    command: &Command,
    target: &Arc<dyn Target>,
    inputs: &Inputs,
    state: &RunState,
) -> Result<BTreeMap<String, String>, RunError> {
    let args = resolve_args(name, command, inputs, state)?;
    debug!(step = %name, command = %command.path(), args = ?args, "Executing command");

    let result = AssertUnwindSafe(target.execute(command, &args))
        .catch_unwind()
        .await
        .map_err(|payload| RunError::Panicked {
            step: name.to_string(),
            message: panic_message(payload),
        })?
        .map_err(|source| RunError::Execution {
            step: name.to_string(),
            source,
        })?;

    let captured = copy_streams(result, target.stdout(), target.stderr())
        .await
        .map_err(|source| RunError::Stream {
            step: name.to_string(),
            source,
        })?;

    Ok(BTreeMap::from([(STDOUT_KEY.to_string(), captured.stdout)]))
}

async fn run_func_step(
    name: &str,
    func: &Func,
    target: &Arc<dyn Target>,
    inputs: &Arc<Inputs>,
    state: &RunState,
) -> Result<BTreeMap<String, String>, RunError> {
    let ctx = StepContext::new(name, Arc::clone(target), Arc::clone(inputs), Arc::new(state.clone()));

    AssertUnwindSafe(func.call(ctx.clone()))
        .catch_unwind()
        .await
        .map_err(|payload| RunError::Panicked {
            step: name.to_string(),
            message: panic_message(payload),
        })?
        .map_err(|source| RunError::Func {
            step: name.to_string(),
            source,
        })?;

    let mut outputs = ctx.outputs();
    for key in outputs.keys() {
        if !func.outputs().contains(key) {
            warn!(step = %name, key = %key, "Function set an undeclared output");
        }
    }
    for key in func.outputs() {
        outputs.entry(key.clone()).or_default();
    }

    Ok(outputs)
}
