//! # Invocation Arguments
//!
//! The arguments a caller passed to a transition. They reach the method
//! body, computed-target resolvers, the notification hooks and the success
//! callback unchanged.
//!
//! `by` and `description` are audit context: who triggered the transition
//! and why. They are carried to the hooks so that a logging collaborator
//! can record them without each method declaring them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Positional and keyword arguments of one transition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, Value>,
    /// Who triggered the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// Why the transition was triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Invocation {
    /// An invocation with no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Record who triggered the transition.
    pub fn by(mut self, principal: impl Into<String>) -> Self {
        self.by = Some(principal.into());
        self
    }

    /// Record why the transition was triggered.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Positional argument `index`.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword argument `name`.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}
