//! Integration tests for the bash script compiler.

use std::sync::Arc;

use stepforge::script::{compile_script, ScriptOptions};
use stepforge::target::{OutputSink, ProcessTarget, RecordingTarget};
use stepforge::{cmd, demo, run_task, Command, Func, Inputs, TaskBuilder, TaskScope};

const SELF: &str = "/usr/local/bin/stepforge";

#[test]
fn test_seed_guard_and_command_line() {
    let mut b = TaskBuilder::new().with_input("seed");
    let seed = b.input("seed").unwrap();
    b.step("start cluster", cmd!("kind", "create", "cluster", "--name", seed));
    let task = b.build().unwrap();

    let script = compile_script(
        &task,
        &Inputs::new().with("seed", "${SEED}"),
        &ScriptOptions::new(SELF),
    )
    .unwrap();

    let lines: Vec<_> = script.lines().collect();
    assert_eq!(lines[0], "#!/usr/bin/env bash");
    assert_eq!(lines[1], "set -e");
    assert_eq!(
        lines[2],
        r#"if [ -z "${SEED}" ]; then echo "input seed is empty" >&2; exit 1; fi"#
    );
    assert_eq!(lines[3], "kind create cluster --name ${SEED}");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_kind_pipeline_script() {
    let mut b = TaskBuilder::new();
    demo::kind_e2e(&mut b).unwrap();
    let task = b.build().unwrap();

    let script = compile_script(
        &task,
        &Inputs::new().with("seed", "${SEED}"),
        &ScriptOptions::new(SELF),
    )
    .unwrap();

    let expected = concat!(
        "#!/usr/bin/env bash\n",
        "set -e\n",
        "if [ -z \"${SEED}\" ]; then echo \"input seed is empty\" >&2; exit 1; fi\n",
        "kind create cluster --name ${SEED}\n",
        "helm upgrade --install ../charts/actions-runner-controller ${SEED}\n",
        "kubectl apply -f testdata/\n",
        "kubectl wait -n actions-runner-system deploy/controller-manager\n",
        "ghcp empty-commit -u mumoshu -r actions-test -m empty commit 1 -b main\n",
        "/usr/local/bin/stepforge run-task-step \"generate workflow\"\n",
        "ghcp commit -u mumoshu -r actions-test -m empty commit 1 -b main ${GEN_YAMLPATH}\n",
    );
    assert_eq!(script, expected);
}

#[tokio::test]
async fn test_compiled_lines_match_engine_invocations() {
    let mut b = TaskBuilder::new().with_input("seed").with_input("chart");
    let seed = b.input("seed").unwrap();
    let chart = b.input("chart").unwrap();
    b.step("start cluster", cmd!("kind", "create", "cluster", "--name", seed.clone()));
    b.step(
        "note",
        Func::new("note", ["message"], |ctx| async move {
            ctx.set("message", "noted");
            Ok(())
        }),
    );
    b.step("deploy controller", cmd!("helm", "upgrade", "--install", chart, seed));
    b.step("deploy runners", cmd!("kubectl", "apply", "-f", "testdata/"));
    let task = b.build().unwrap();

    let inputs = Inputs::new().with("seed", "e2e").with("chart", "stable/nginx");

    let script = compile_script(&task, &inputs, &ScriptOptions::new(SELF)).unwrap();
    let compiled: Vec<&str> = script
        .lines()
        .skip(2)
        .filter(|l| !l.starts_with("if [ -z"))
        .filter(|l| !l.contains(" run-task-step "))
        .collect();

    let target = RecordingTarget::new();
    run_task(&task, Arc::new(target.clone()), &inputs).await.unwrap();
    let executed: Vec<String> = target.invocations().iter().map(|i| i.command_line()).collect();

    assert_eq!(compiled, executed);
}

#[tokio::test]
async fn test_compiled_script_runs_under_bash() {
    let mut b = TaskBuilder::new().with_input("seed");
    let seed = b.input("seed").unwrap();
    b.step("greet", cmd!("echo", "hello", seed));
    let task = b.build().unwrap();

    let script = compile_script(
        &task,
        &Inputs::new().with("seed", "${SEED}"),
        &ScriptOptions::new(SELF),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.sh");
    std::fs::write(&path, &script).unwrap();
    let path = path.to_string_lossy().into_owned();

    let target = Arc::new(
        ProcessTarget::new()
            .with_env("SEED", "e2e")
            .with_stdout(OutputSink::Discard),
    );
    let mut run = TaskBuilder::new();
    run.step("script", Command::new("bash").arg(path.as_str()));
    let state = run_task(&run.build().unwrap(), target, &Inputs::new()).await.unwrap();
    assert_eq!(state.get("script", "stdout"), Some("hello e2e\n"));

    let target = Arc::new(
        ProcessTarget::new()
            .with_env("SEED", "")
            .with_stderr(OutputSink::Discard),
    );
    let mut run = TaskBuilder::new();
    run.step("script", Command::new("bash").arg(path.as_str()));
    let err = run_task(&run.build().unwrap(), target, &Inputs::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("input seed is empty"));
}
