//! Per-run output state.

use std::collections::BTreeMap;

use serde::Serialize;

/// Outputs recorded by the steps of one run, keyed by step name then output key.
///
/// Entries are added strictly in step order and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunState {
    steps: BTreeMap<String, BTreeMap<String, String>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs of a completed step, `None` if it has not run.
    pub fn outputs(&self, step: &str) -> Option<&BTreeMap<String, String>> {
        self.steps.get(step)
    }

    /// A single recorded output.
    pub fn get(&self, step: &str, key: &str) -> Option<&str> {
        self.steps
            .get(step)
            .and_then(|outputs| outputs.get(key))
            .map(String::as_str)
    }

    pub fn has_run(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    pub(crate) fn record(&mut self, step: impl Into<String>, outputs: BTreeMap<String, String>) {
        self.steps.insert(step.into(), outputs);
    }

    /// Number of steps with recorded outputs.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        self.steps.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut state = RunState::new();
        assert!(state.is_empty());

        state.record(
            "start cluster",
            BTreeMap::from([("stdout".to_string(), "ok\n".to_string())]),
        );

        assert!(state.has_run("start cluster"));
        assert_eq!(state.get("start cluster", "stdout"), Some("ok\n"));
        assert_eq!(state.get("start cluster", "stderr"), None);
        assert_eq!(state.get("stop cluster", "stdout"), None);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_serializes_as_nested_map() {
        let mut state = RunState::new();
        state.record("gen", BTreeMap::from([("yamlPath".to_string(), "a.yaml".to_string())]));
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"gen":{"yamlPath":"a.yaml"}}"#);
    }
}
