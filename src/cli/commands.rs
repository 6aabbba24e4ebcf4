//! CLI command definitions for stepforge.
//!
//! The binary wraps one task definition and offers to run it, compile it to
//! a bash script, run a single function step (the callback emitted by the
//! compiler), or list its steps.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use crate::engine::{run_cleanup, run_step, run_task, RunState};
use crate::error::DefineError;
use crate::script::{compile_script, ScriptOptions};
use crate::target::{ProcessTarget, Target};
use crate::task::{Inputs, Runnable, Task, TaskBuilder};

/// Run, compile or inspect a step pipeline.
#[derive(Parser, Debug)]
#[command(name = "stepforge")]
#[command(about = "Run a linear step pipeline, or compile it to a bash script")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", env = "STEPFORGE_LOG", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run every step in order, then the cleanup steps.
    Run(RunArgs),

    /// Print the task as a bash script.
    Compile(CompileArgs),

    /// Run one function step and print its outputs as NAME=value lines.
    #[command(name = "run-task-step")]
    RunTaskStep(RunTaskStepArgs),

    /// List the declared steps.
    Steps,
}

/// Task input sources shared by the subcommands.
#[derive(clap::Args, Debug, Default)]
pub struct InputArgs {
    /// Task input as key=value. Takes precedence over the inputs file and
    /// the environment.
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub inputs: Vec<(String, String)>,

    /// JSON object of string inputs.
    #[arg(long, value_name = "FILE")]
    pub inputs_file: Option<PathBuf>,
}

/// Arguments for `stepforge run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Print the recorded step outputs as JSON once the run completes.
    #[arg(long)]
    pub json: bool,

    /// Skip the cleanup steps.
    #[arg(long)]
    pub no_cleanup: bool,
}

/// Arguments for `stepforge compile`.
#[derive(clap::Args, Debug)]
pub struct CompileArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Write the script to this file and mark it executable.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `stepforge run-task-step`.
#[derive(clap::Args, Debug)]
pub struct RunTaskStepArgs {
    /// Name of the function step to run.
    pub name: String,

    #[command(flatten)]
    pub inputs: InputArgs,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid input {:?}: expected KEY=VALUE", s))?;
    if key.is_empty() {
        return Err(format!("invalid input {:?}: empty key", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the sample pipeline.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli(), crate::demo::kind_e2e).await
}

/// Run the CLI against the task produced by `define`.
pub async fn run_with_cli<F>(cli: Cli, define: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut TaskBuilder) -> Result<(), DefineError>,
{
    let mut builder = TaskBuilder::new();
    define(&mut builder).context("Failed to define task")?;
    let task = builder.build().context("Failed to define task")?;

    match cli.command {
        Commands::Run(args) => run_command(&task, args).await,
        Commands::Compile(args) => compile_command(&task, args),
        Commands::RunTaskStep(args) => run_task_step_command(&task, args).await,
        Commands::Steps => {
            print!("{}", describe_steps(&task));
            Ok(())
        }
    }
}

async fn run_command(task: &Task, args: RunArgs) -> anyhow::Result<()> {
    let inputs = collect_inputs(task, &args.inputs, env_lookup, false)?;
    let target: Arc<dyn Target> = Arc::new(ProcessTarget::new());

    let result = run_task(task, Arc::clone(&target), &inputs).await;

    let cleanup = if args.no_cleanup || task.cleanup().is_empty() {
        Ok(())
    } else {
        info!(steps = task.cleanup().len(), "Running cleanup");
        let empty = RunState::new();
        let state = result.as_ref().unwrap_or(&empty);
        run_cleanup(task, target, &inputs, state).await
    };

    let state = result.context("Task failed")?;
    cleanup.context("Cleanup failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}

fn compile_command(task: &Task, args: CompileArgs) -> anyhow::Result<()> {
    let inputs = collect_inputs(task, &args.inputs, env_lookup, true)?;
    let script = compile_script(task, &inputs, &ScriptOptions::from_current_process())
        .context("Failed to compile task")?;

    match args.output {
        Some(path) => {
            write_executable(&path, &script)?;
            info!(path = %path.display(), "Wrote script");
        }
        None => {
            std::io::stdout().write_all(script.as_bytes())?;
        }
    }
    Ok(())
}

async fn run_task_step_command(task: &Task, args: RunTaskStepArgs) -> anyhow::Result<()> {
    let Some(step) = task.find_step(&args.name) else {
        bail!("no step named {:?}", args.name);
    };
    let Runnable::Func(func) = step.runnable() else {
        bail!("step {:?} is a command step; only function steps can be run on their own", args.name);
    };

    let inputs = collect_inputs(task, &args.inputs, env_lookup, false)?;
    let mut state = RunState::new();
    run_step(step, Arc::new(ProcessTarget::new()), &inputs, &mut state)
        .await
        .with_context(|| format!("Step {:?} failed", args.name))?;

    if let Some(outputs) = state.outputs(step.name()) {
        for (key, value) in outputs {
            println!("{}={}", func.variable_name(key), value);
        }
    }
    Ok(())
}

/// Human-readable listing of the main and cleanup steps.
pub fn describe_steps(task: &Task) -> String {
    let mut out = String::new();
    let sections = [("steps", task.steps()), ("cleanup", task.cleanup())];
    for (title, steps) in sections {
        if steps.is_empty() {
            continue;
        }
        out.push_str(title);
        out.push_str(":\n");
        for (i, step) in steps.iter().enumerate() {
            let detail = match step.runnable() {
                Runnable::Command(command) => command.to_string(),
                Runnable::Func(func) => format!("func {} -> [{}]", func.name(), func.outputs().join(", ")),
            };
            out.push_str(&format!("  {}. {}: {}\n", i + 1, step.name(), detail));
        }
    }
    out
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Gathers a value for every declared input.
///
/// Sources in priority order: `--input` flags, the inputs file, then the
/// environment variable named after the upper-cased key, which is the name
/// `env` is called with. With
/// `placeholders` set, inputs found nowhere become `${KEY}` so that a
/// compiled script reads them at its own run time.
pub fn collect_inputs<E>(task: &Task, args: &InputArgs, env: E, placeholders: bool) -> anyhow::Result<Inputs>
where
    E: Fn(&str) -> Option<String>,
{
    let from_file: BTreeMap<String, String> = match &args.inputs_file {
        Some(path) => read_inputs_file(path)?,
        None => BTreeMap::new(),
    };

    let mut inputs = Inputs::new();
    for key in task.inputs().keys() {
        let flag = args.inputs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        let value = flag
            .or_else(|| from_file.get(key).cloned())
            .or_else(|| env(&key.to_uppercase()));

        match value {
            Some(value) => inputs.insert(key, value),
            None if placeholders => inputs.insert(key, format!("${{{}}}", key.to_uppercase())),
            None => warn!(input = %key, "No value provided for input"),
        }
    }

    for (key, _) in &args.inputs {
        if !task.inputs().contains(key) {
            warn!(input = %key, "Ignoring value for undeclared input");
        }
    }

    Ok(inputs)
}

fn read_inputs_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read inputs file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Inputs file {} must be a JSON object of strings", path.display()))
}

fn write_executable(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Command, Func, TaskScope};
    use clap::CommandFactory;

    fn task() -> Task {
        let mut b = TaskBuilder::new().with_input("seed").with_input("region");
        let seed = b.input("seed").unwrap();
        b.defer("stop", Command::new("kind").arg("delete").arg(seed.clone()));
        b.step("start", Command::new("kind").arg("create").arg(seed));
        b.step("gen", Func::new("gen", ["yamlPath"], |_ctx| async { Ok(()) }));
        b.build().unwrap()
    }

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "stepforge", "run", "--input", "seed=abc", "-i", "region=eu=west", "--json",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(
                    args.inputs.inputs,
                    vec![
                        ("seed".to_string(), "abc".to_string()),
                        ("region".to_string(), "eu=west".to_string()),
                    ]
                );
                assert!(args.json);
                assert!(!args.no_cleanup);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_run_task_step_arguments() {
        let cli = Cli::try_parse_from(["stepforge", "run-task-step", "generate workflow"]).expect("should parse");
        match cli.command {
            Commands::RunTaskStep(args) => assert_eq!(args.name, "generate workflow"),
            _ => panic!("Expected RunTaskStep command"),
        }
    }

    #[test]
    fn test_invalid_input_flag() {
        assert!(Cli::try_parse_from(["stepforge", "run", "--input", "seed"]).is_err());
        assert!(Cli::try_parse_from(["stepforge", "run", "--input", "=x"]).is_err());
    }

    #[test]
    fn test_collect_inputs_priority() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("inputs.json");
        fs::write(&file, r#"{"seed": "from-file", "region": "file-region"}"#).unwrap();

        let args = InputArgs {
            inputs: vec![("seed".to_string(), "from-flag".to_string())],
            inputs_file: Some(file),
        };
        let env = |key: &str| (key == "REGION").then(|| "env-region".to_string());

        let inputs = collect_inputs(&task(), &args, env, false).unwrap();
        assert_eq!(inputs.get("seed"), Some("from-flag"));
        assert_eq!(inputs.get("region"), Some("file-region"));

        let inputs = collect_inputs(&task(), &InputArgs::default(), env, false).unwrap();
        assert_eq!(inputs.get("seed"), None);
        assert_eq!(inputs.get("region"), Some("env-region"));
    }

    #[test]
    fn test_collect_inputs_placeholders() {
        let inputs = collect_inputs(&task(), &InputArgs::default(), |_| None, true).unwrap();
        assert_eq!(inputs.get("seed"), Some("${SEED}"));
        assert_eq!(inputs.get("region"), Some("${REGION}"));
    }

    #[test]
    fn test_bad_inputs_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("inputs.json");
        fs::write(&file, r#"{"seed": 1}"#).unwrap();

        let args = InputArgs {
            inputs: Vec::new(),
            inputs_file: Some(file),
        };
        assert!(collect_inputs(&task(), &args, |_| None, false).is_err());
    }

    #[test]
    fn test_describe_steps() {
        assert_eq!(
            describe_steps(&task()),
            "steps:\n  1. start: kind create {inputs.seed}\n  2. gen: func gen -> [yamlPath]\ncleanup:\n  1. stop: kind delete {inputs.seed}\n"
        );
    }

    #[test]
    fn test_write_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.sh");
        write_executable(&path, "#!/usr/bin/env bash\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/usr/bin/env bash\n");
    }
}
