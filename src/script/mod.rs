//! Bash script compiler.
//!
//! Walks a task exactly like the engine does but performs no effects: each
//! command step becomes one line of shell, and each function step becomes a
//! re-invocation of the current program (`<self> run-task-step "<name>"`).
//! Later steps that reference outputs see shell placeholders instead of real
//! values:
//!
//! - command steps expose `stdout` as `${<STEP>_STDOUT}`
//! - function steps expose each declared key as `${<FUNC>_<KEY>}`
//!
//! Argument values are joined with single spaces and never quoted.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::debug;

use crate::engine::{resolve_args, RunState};
use crate::error::{CompileError, ResolveError};
use crate::task::{Inputs, Runnable, Task, STDOUT_KEY};

/// Shebang written on the first line of every script.
pub const DEFAULT_SHEBANG: &str = "#!/usr/bin/env bash";

/// Pseudo step name used when a declared input is missing at compile time.
const INPUTS_STEP: &str = "task inputs";

/// Settings for the emitted script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    shebang: String,
    self_invocation: String,
}

impl ScriptOptions {
    /// `self_invocation` is the program the script calls back into for
    /// function steps.
    pub fn new(self_invocation: impl Into<String>) -> Self {
        Self {
            shebang: DEFAULT_SHEBANG.to_string(),
            self_invocation: self_invocation.into(),
        }
    }

    /// Options calling back into the currently running program (`argv[0]`).
    pub fn from_current_process() -> Self {
        let argv0 = std::env::args().next().unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        Self::new(argv0)
    }

    pub fn with_shebang(mut self, shebang: impl Into<String>) -> Self {
        self.shebang = shebang.into();
        self
    }
}

/// Shell variable name standing for a command step's stdout,
/// e.g. `DEPLOY_RUNNERS_STDOUT` for `deploy runners`.
pub fn stdout_variable(step: &str) -> String {
    let sanitized: String = step
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_STDOUT", sanitized)
}

/// Writes `task` as a bash script to `writer`.
///
/// Every input the task declares must be present in `inputs`; its value is
/// substituted literally, so passing `${SEED}` defers it to the script's
/// environment.
pub fn write_script<W: Write>(
    task: &Task,
    inputs: &Inputs,
    options: &ScriptOptions,
    writer: &mut W,
) -> Result<(), CompileError> {
    writeln!(writer, "{}", options.shebang)?;
    writeln!(writer, "set -e")?;

    let mut declared: Vec<&str> = task.inputs().keys().collect();
    declared.sort_unstable();
    for key in declared {
        let value = inputs.get(key).ok_or_else(|| ResolveError::MissingInput {
            step: INPUTS_STEP.to_string(),
            key: key.to_string(),
        })?;
        writeln!(
            writer,
            r#"if [ -z "{}" ]; then echo "input {} is empty" >&2; exit 1; fi"#,
            value, key
        )?;
    }

    let mut state = RunState::new();
    for step in task.steps() {
        let outputs = match step.runnable() {
            Runnable::Command(command) => {
                let args = resolve_args(step.name(), command, inputs, &state)?;
                let line = std::iter::once(command.path())
                    .chain(args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(writer, "{}", line)?;

                BTreeMap::from([(STDOUT_KEY.to_string(), format!("${{{}}}", stdout_variable(step.name())))])
            }
            Runnable::Func(func) => {
                writeln!(writer, "{} run-task-step {:?}", options.self_invocation, step.name())?;

                func.outputs()
                    .iter()
                    .map(|key| (key.clone(), func.placeholder(key)))
                    .collect()
            }
        };

        debug!(step = %step.name(), "Compiled step");
        state.record(step.name(), outputs);
    }

    Ok(())
}

/// Compiles `task` into a bash script held in memory.
pub fn compile_script(task: &Task, inputs: &Inputs, options: &ScriptOptions) -> Result<String, CompileError> {
    let mut buf = Vec::new();
    write_script(task, inputs, options, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Command, Func, TaskBuilder, TaskScope};

    fn options() -> ScriptOptions {
        ScriptOptions::new("/usr/local/bin/stepforge")
    }

    #[test]
    fn test_single_command_with_input_placeholder() {
        let mut b = TaskBuilder::new().with_input("seed");
        let seed = b.input("seed").unwrap();
        let create = b.cmd("kind", ["create", "cluster", "--name"]).arg(seed);
        b.step("start cluster", create);
        let task = b.build().unwrap();

        let script = compile_script(&task, &Inputs::new().with("seed", "${SEED}"), &options()).unwrap();
        assert_eq!(
            script,
            concat!(
                "#!/usr/bin/env bash\n",
                "set -e\n",
                "if [ -z \"${SEED}\" ]; then echo \"input seed is empty\" >&2; exit 1; fi\n",
                "kind create cluster --name ${SEED}\n",
            )
        );
    }

    #[test]
    fn test_function_steps_reinvoke_self_and_expose_placeholders() {
        let mut b = TaskBuilder::new();
        let gen = b.step(
            "generate workflow",
            Func::new("gen", ["yamlPath"], |_ctx| async { Ok(()) }),
        );
        let list = b.step("list files", Command::new("ls"));
        b.step(
            "setup workflow",
            Command::new("ghcp")
                .arg("commit")
                .arg(gen.get("yamlPath").unwrap())
                .arg(list.get("stdout").unwrap()),
        );
        let task = b.build().unwrap();

        let script = compile_script(&task, &Inputs::new(), &options()).unwrap();
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[2], r#"/usr/local/bin/stepforge run-task-step "generate workflow""#);
        assert_eq!(lines[3], "ls");
        assert_eq!(lines[4], "ghcp commit ${GEN_YAMLPATH} ${LIST_FILES_STDOUT}");
    }

    #[test]
    fn test_unresolvable_reference_fails() {
        let mut b = TaskBuilder::new();
        b.step(
            "setup workflow",
            Command::new("ghcp").arg(crate::task::Ref::output("generate workflow", "yamlPath")),
        );
        let task = b.build().unwrap();

        let err = compile_script(&task, &Inputs::new(), &options()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Resolve(ResolveError::ProducerNotRun { .. })
        ));
    }

    #[test]
    fn test_missing_declared_input_fails() {
        let task = TaskBuilder::new().with_input("seed").build().unwrap();
        let err = compile_script(&task, &Inputs::new(), &options()).unwrap_err();
        assert!(err.to_string().contains("seed"));
    }

    #[test]
    fn test_custom_shebang_and_stdout_variable() {
        let task = TaskBuilder::new().build().unwrap();
        let opts = options().with_shebang("#!/bin/bash");
        assert_eq!(compile_script(&task, &Inputs::new(), &opts).unwrap(), "#!/bin/bash\nset -e\n");
        assert_eq!(stdout_variable("deploy runners"), "DEPLOY_RUNNERS_STDOUT");
        assert_eq!(stdout_variable("a-b.c"), "A_B_C_STDOUT");
    }
}
