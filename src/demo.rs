//! Sample pipeline: end-to-end test of a runner controller on a kind cluster.

use crate::error::DefineError;
use crate::task::{Func, TaskBuilder, TaskScope};

/// Output of the `generate workflow` step holding the workflow file path.
pub const YAML_PATH: &str = "yamlPath";

/// Defines the pipeline. Requires the `seed` input, which names the cluster
/// and the generated workflow.
pub fn kind_e2e(s: &mut TaskBuilder) -> Result<(), DefineError> {
    s.declare_input("seed");
    let seed = s.input("seed")?;

    let stop = s.cmd("kind", ["delete", "cluster", "--name"]).arg(seed.clone());
    s.defer("stop cluster", stop);

    let start = s.cmd("kind", ["create", "cluster", "--name"]).arg(seed.clone());
    s.step("start cluster", start);

    let deploy = s
        .cmd("helm", ["upgrade", "--install", "../charts/actions-runner-controller"])
        .arg(seed);
    s.step("deploy controller", deploy);

    let runners = s.cmd("kubectl", ["apply", "-f", "testdata/"]);
    s.step("deploy runners", runners);

    let wait = s.cmd("kubectl", ["wait", "-n", "actions-runner-system", "deploy/controller-manager"]);
    s.step("wait for runners", wait);

    let trigger = s.cmd(
        "ghcp",
        ["empty-commit", "-u", "mumoshu", "-r", "actions-test", "-m", "empty commit 1", "-b", "main"],
    );
    s.step("trigger workflow run", trigger);

    let gen = s.step(
        "generate workflow",
        Func::new("gen", [YAML_PATH], |ctx| async move {
            let seed = ctx.get("seed")?;
            let echo = ctx.cmd("bash").args(["-c", "echo test"]).exec().await?;

            ctx.set(YAML_PATH, format!(".github/workflows/{}.yaml", seed));
            ctx.set("echoTest", echo.stdout);
            Ok(())
        }),
    );

    let setup = s
        .cmd(
            "ghcp",
            ["commit", "-u", "mumoshu", "-r", "actions-test", "-m", "empty commit 1", "-b", "main"],
        )
        .arg(gen.get(YAML_PATH)?);
    s.step("setup workflow", setup);

    Ok(())
}
