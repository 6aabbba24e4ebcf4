//! Reference resolution shared by the engine and the script compiler.

use super::state::RunState;
use crate::error::ResolveError;
use crate::task::{Arg, Command, Inputs, Ref};

/// Resolves one reference on behalf of `step`.
///
/// Input references read `inputs`; step references read the outputs recorded
/// in `state`, which only holds steps that already completed.
pub fn resolve_ref(step: &str, r: &Ref, inputs: &Inputs, state: &RunState) -> Result<String, ResolveError> {
    let Some(producer) = r.step() else {
        return inputs
            .get(r.key())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::MissingInput {
                step: step.to_string(),
                key: r.key().to_string(),
            });
    };

    let outputs = state.outputs(producer).ok_or_else(|| ResolveError::ProducerNotRun {
        step: step.to_string(),
        producer: producer.to_string(),
        key: r.key().to_string(),
    })?;

    outputs
        .get(r.key())
        .cloned()
        .ok_or_else(|| ResolveError::MissingOutput {
            step: step.to_string(),
            producer: producer.to_string(),
            key: r.key().to_string(),
        })
}

/// Resolves every argument of `command`, failing on the first bad reference.
pub fn resolve_args(
    step: &str,
    command: &Command,
    inputs: &Inputs,
    state: &RunState,
) -> Result<Vec<String>, ResolveError> {
    command
        .get_args()
        .iter()
        .map(|arg| match arg {
            Arg::Literal(s) => Ok(s.clone()),
            Arg::Ref(r) => resolve_ref(step, r, inputs, state),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn state_with(step: &str, key: &str, value: &str) -> RunState {
        let mut state = RunState::new();
        state.record(step, BTreeMap::from([(key.to_string(), value.to_string())]));
        state
    }

    #[test]
    fn test_literals_pass_through() {
        let c = Command::new("kubectl").args(["apply", "-f", "testdata/"]);
        let args = resolve_args("deploy", &c, &Inputs::new(), &RunState::new()).unwrap();
        assert_eq!(args, vec!["apply", "-f", "testdata/"]);
    }

    #[test]
    fn test_input_reference() {
        let c = Command::new("kind").args(["create", "cluster", "--name"]).arg(Ref::input("seed"));
        let inputs = Inputs::new().with("seed", "abc");
        let args = resolve_args("start cluster", &c, &inputs, &RunState::new()).unwrap();
        assert_eq!(args.last().map(String::as_str), Some("abc"));

        let err = resolve_args("start cluster", &c, &Inputs::new(), &RunState::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingInput {
                step: "start cluster".to_string(),
                key: "seed".to_string(),
            }
        );
    }

    #[test]
    fn test_step_reference() {
        let r = Ref::output("generate workflow", "yamlPath");
        let state = state_with("generate workflow", "yamlPath", ".github/workflows/x.yaml");
        assert_eq!(
            resolve_ref("setup workflow", &r, &Inputs::new(), &state).unwrap(),
            ".github/workflows/x.yaml"
        );
    }

    #[test]
    fn test_producer_not_run() {
        let r = Ref::output("generate workflow", "yamlPath");
        let err = resolve_ref("setup workflow", &r, &Inputs::new(), &RunState::new()).unwrap_err();
        assert!(matches!(err, ResolveError::ProducerNotRun { ref producer, ref key, .. }
            if producer == "generate workflow" && key == "yamlPath"));
    }

    #[test]
    fn test_missing_output_key() {
        let r = Ref::output("start cluster", "stderr");
        let state = state_with("start cluster", "stdout", "");
        let err = resolve_ref("next", &r, &Inputs::new(), &state).unwrap_err();
        assert!(matches!(err, ResolveError::MissingOutput { .. }));
    }
}
