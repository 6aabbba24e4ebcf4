//! References, per-step output registries and task inputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DefineError;

/// A lazily resolved value: either an external task input or an output of an
/// earlier step.
///
/// `Ref`s are only handed out by [`Values::get`] (and the builder helpers that
/// wrap it), so holding one means the key was declared when the task was
/// defined. Whether the value actually exists is decided at run or compile
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    /// Producing step, `None` for task inputs.
    step: Option<String>,
    key: String,
}

impl Ref {
    /// Creates a reference to a task input.
    pub fn input(key: impl Into<String>) -> Self {
        Self {
            step: None,
            key: key.into(),
        }
    }

    /// Creates a reference to an output of the named step.
    ///
    /// Prefer [`StepHandle::get`](crate::task::StepHandle::get), which checks
    /// that the step declares `key`.
    pub fn output(step: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            key: key.into(),
        }
    }

    /// The producing step, or `None` for a task input.
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_input(&self) -> bool {
        self.step.is_none()
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "{}.{}", step, self.key),
            None => write!(f, "inputs.{}", self.key),
        }
    }
}

/// The set of keys a step (or the task inputs) promises to produce.
///
/// A key must be declared with [`Values::define`] before [`Values::get`] hands
/// out a [`Ref`] for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    owner: Option<String>,
    keys: Vec<String>,
}

impl Values {
    /// Creates an empty registry owned by the named step.
    pub fn for_step(step: impl Into<String>) -> Self {
        Self {
            owner: Some(step.into()),
            keys: Vec::new(),
        }
    }

    /// Creates an empty registry for task inputs.
    pub fn for_inputs() -> Self {
        Self::default()
    }

    /// Declares `key`. Declaring the same key twice is a no-op.
    pub fn define(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Returns a reference to `key`, failing if it was never declared.
    pub fn get(&self, key: &str) -> Result<Ref, DefineError> {
        if !self.contains(key) {
            return Err(DefineError::ValueNotDefined {
                owner: self.owner.clone(),
                key: key.to_string(),
            });
        }

        Ok(Ref {
            step: self.owner.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Declared keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Owning step name, `None` for task inputs.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Concrete values supplied for task inputs, keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inputs(BTreeMap<String, String>);

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates inputs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Inputs
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
