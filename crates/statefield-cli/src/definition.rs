//! # Machine Definitions
//!
//! Declarative YAML description of one state field and its transitions,
//! turned into a runnable [`Machine`] over a simulated [`Document`].
//!
//! ```yaml
//! model: BlogPost
//! field: state
//! initial: new
//! protected: true
//! states: [new, draft, published, failed, { value: hidden, label: Hidden }]
//! options:
//!   condition_errors: propagate
//! transitions:
//!   - name: publish
//!     source: [new, draft]
//!     target: published
//!     on_error: failed
//!     conditions: [has_title]
//!     permission: blog.publish
//!   - name: moderate
//!     source: for_moderators
//!     return_value: [published, rejected]
//! ```
//!
//! A simulated document has no data beyond its state. Conditions are named
//! flags: a condition holds when the document carries the flag of the same
//! name. The method body fails on demand and returns a chosen result, so
//! every executor path can be exercised from the command line.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statefield_core::{FieldId, StateDomain, StateKind, StateValue};
use statefield_machine::{
    Machine, MachineOptions, SourceSpec, StateCell, StateField, Stateful, TransitionDescriptor,
};

/// One state field and its transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineDefinition {
    /// Record type name.
    pub model: String,
    /// State field name.
    pub field: String,
    /// Value kind of the field.
    #[serde(default = "default_kind")]
    pub kind: StateKind,
    /// State new documents start in.
    #[serde(default)]
    pub initial: Option<StateValue>,
    /// Refuse direct assignment.
    #[serde(default)]
    pub protected: bool,
    /// Declared states. Empty means any value of the kind.
    #[serde(default)]
    pub states: Vec<StateDefinition>,
    /// Runtime options.
    #[serde(default)]
    pub options: MachineOptions,
    /// Transitions, in declaration order.
    pub transitions: Vec<TransitionDefinition>,
}

fn default_kind() -> StateKind {
    StateKind::Text
}

/// A declared state, bare or labelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateDefinition {
    /// `published`
    Bare(StateValue),
    /// `{ value: published, label: Published }`
    Labelled {
        /// The stored value.
        value: StateValue,
        /// Display label.
        label: String,
    },
}

impl StateDefinition {
    /// The stored value.
    pub fn value(&self) -> &StateValue {
        match self {
            Self::Bare(value) | Self::Labelled { value, .. } => value,
        }
    }
}

/// Source notation: a single state or pattern, or a list of states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDefinition {
    /// `new`, `"*"`, `"+"`, `"WRK-*"`, or `3`.
    One(StateValue),
    /// `[new, draft]`
    Many(Vec<StateValue>),
}

impl Default for SourceDefinition {
    fn default() -> Self {
        Self::One(StateValue::text("*"))
    }
}

impl SourceDefinition {
    /// The equivalent source specification.
    pub fn to_spec(&self) -> SourceSpec {
        match self {
            Self::One(value) => SourceSpec::from(value.clone()),
            Self::Many(values) => SourceSpec::states(values.iter().cloned()),
        }
    }
}

/// One transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDefinition {
    /// Transition name.
    pub name: String,
    /// Source notation; `*` when omitted.
    #[serde(default)]
    pub source: SourceDefinition,
    /// Fixed target.
    #[serde(default)]
    pub target: Option<StateValue>,
    /// Use the method's result as the target, restricted to these states.
    #[serde(default)]
    pub return_value: Option<Vec<StateValue>>,
    /// State applied when the method fails.
    #[serde(default)]
    pub on_error: Option<StateValue>,
    /// Names of flags that must be set on the document.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Capability required to run the transition.
    #[serde(default)]
    pub permission: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

impl MachineDefinition {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse machine definition")
    }

    /// Read, parse and validate a definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let definition = Self::from_yaml(&text)
            .with_context(|| format!("in {}", path.display()))?;
        let problems = definition.problems();
        if !problems.is_empty() {
            bail!(
                "{} is invalid:\n  - {}",
                path.display(),
                problems.join("\n  - ")
            );
        }
        tracing::debug!(
            path = %path.display(),
            model = %definition.model,
            transitions = definition.transitions.len(),
            "loaded machine definition"
        );
        Ok(definition)
    }

    /// The field domain described by `kind` and `states`.
    pub fn domain(&self) -> StateDomain {
        let mut domain = match self.kind {
            StateKind::Text => StateDomain::text(),
            StateKind::Integer => StateDomain::integer(),
        };
        for state in &self.states {
            domain = match state {
                StateDefinition::Bare(value) => domain.choice(value.clone(), value.to_string()),
                StateDefinition::Labelled { value, label } => domain.choice(value.clone(), label),
            };
        }
        domain
    }

    /// Interpret a command-line state according to the field kind.
    pub fn parse_state(&self, text: &str) -> Result<StateValue> {
        match self.kind {
            StateKind::Text => Ok(StateValue::text(text)),
            StateKind::Integer => text
                .parse::<i64>()
                .map(StateValue::from)
                .with_context(|| format!("'{text}' is not an integer state")),
        }
    }

    /// Everything wrong with this definition. Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let domain = self.domain();
        let mut check = |what: String, value: &StateValue| {
            if !domain.admits(value) {
                problems.push(format!("{what} '{value}' is not a declared {} state", self.kind));
            }
        };

        if let Some(initial) = &self.initial {
            check("initial state".into(), initial);
        }
        for t in &self.transitions {
            if let SourceSpec::States(states) = t.source.to_spec() {
                for state in &states {
                    check(format!("source of '{}'", t.name), state);
                }
            }
            if let Some(target) = &t.target {
                check(format!("target of '{}'", t.name), target);
            }
            for allowed in t.return_value.iter().flatten() {
                check(format!("return value of '{}'", t.name), allowed);
            }
            if let Some(error_state) = &t.on_error {
                check(format!("error state of '{}'", t.name), error_state);
            }
        }

        let mut declared = HashSet::new();
        for state in &self.states {
            if !declared.insert(state.value()) {
                problems.push(format!("state '{}' is declared twice", state.value()));
            }
        }
        for (i, t) in self.transitions.iter().enumerate() {
            let source = t.source.to_spec();
            let repeated = self.transitions[..i]
                .iter()
                .any(|earlier| earlier.name == t.name && earlier.source.to_spec().overlaps(&source));
            if repeated {
                problems.push(format!(
                    "transition '{}' declares source '{source}' more than once",
                    t.name
                ));
            }
            if t.target.is_some() && t.return_value.is_some() {
                problems.push(format!(
                    "transition '{}' declares both target and return_value",
                    t.name
                ));
            }
        }
        if self.field.is_empty() {
            problems.push("field name is empty".into());
        }
        problems
    }

    /// Build the runnable machine.
    pub fn build(&self) -> Result<Machine<Document>> {
        let problems = self.problems();
        if !problems.is_empty() {
            bail!("invalid definition: {}", problems.join("; "));
        }
        let mut field = StateField::new(FieldId::intern(&self.field)).with_domain(self.domain());
        if self.protected {
            field = field.protected();
        }
        let mut builder = Machine::builder(field)
            .model(self.model.clone())
            .options(self.options);
        for t in &self.transitions {
            builder = builder.register(t.descriptor());
        }
        Ok(builder.build()?)
    }

    /// A fresh document in `state`, or in the initial state.
    pub fn document(&self, machine: &Machine<Document>, state: Option<StateValue>) -> Result<Document> {
        let Some(state) = state.or_else(|| self.initial.clone()) else {
            bail!("no --state given and the definition has no initial state");
        };
        Ok(Document {
            field: machine.field().id(),
            state: machine.new_cell(state),
            flags: BTreeSet::new(),
            fail: false,
            result: Value::Null,
        })
    }
}

impl TransitionDefinition {
    fn descriptor(&self) -> TransitionDescriptor<Document> {
        let mut builder = TransitionDescriptor::builder(self.name.clone()).source(self.source.to_spec());
        if let Some(target) = &self.target {
            builder = builder.target(target.clone());
        }
        if let Some(allowed) = &self.return_value {
            builder = builder.return_value(allowed.iter().cloned());
        }
        if let Some(error_state) = &self.on_error {
            builder = builder.on_error(error_state.clone());
        }
        for flag in &self.conditions {
            let wanted = flag.clone();
            builder = builder.condition(flag.clone(), move |doc: &Document| doc.flags.contains(&wanted));
        }
        if let Some(capability) = &self.permission {
            builder = builder.permission(capability.clone());
        }
        for (key, value) in &self.custom {
            builder = builder.custom(key.clone(), value.clone());
        }
        builder
            .returns(|doc: &mut Document, _| {
                if doc.fail {
                    bail!("simulated failure");
                }
                Ok(doc.result.clone())
            })
            .build()
    }
}

/// A simulated record carrying one state field.
#[derive(Debug, Clone)]
pub struct Document {
    field: FieldId,
    /// The state cell.
    pub state: StateCell,
    /// Flags that satisfy conditions of the same name.
    pub flags: BTreeSet<String>,
    /// Make the method body fail.
    pub fail: bool,
    /// What the method body returns.
    pub result: Value,
}

impl Stateful for Document {
    fn state_fields(&self) -> Vec<FieldId> {
        vec![self.field]
    }

    fn state_cell(&self, field: FieldId) -> Option<&StateCell> {
        (field == self.field).then_some(&self.state)
    }

    fn state_cell_mut(&mut self, field: FieldId) -> Option<&mut StateCell> {
        (field == self.field).then_some(&mut self.state)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG: &str = r#"
model: BlogPost
field: state
initial: new
protected: true
states: [new, draft, published, failed, hidden, for_moderators, rejected]
transitions:
  - name: publish
    source: [new, draft]
    target: published
    on_error: failed
    conditions: [has_title]
    permission: blog.publish
  - name: moderate
    source: for_moderators
    return_value: [published, rejected]
  - name: hide
    source: published
    target: hidden
    custom: { label: Hide }
"#;

    #[test]
    fn parses_every_form() {
        let def = MachineDefinition::from_yaml(BLOG).unwrap();
        assert_eq!(def.model, "BlogPost");
        assert_eq!(def.kind, StateKind::Text);
        assert!(def.problems().is_empty(), "{:?}", def.problems());
        assert_eq!(def.transitions[0].source.to_spec(), SourceSpec::states(["new", "draft"]));
        assert_eq!(
            def.transitions[1].return_value.as_deref(),
            Some(&[StateValue::from("published"), StateValue::from("rejected")][..])
        );
        assert_eq!(def.transitions[2].custom["label"], Value::from("Hide"));
    }

    #[test]
    fn omitted_source_is_any() {
        let def = MachineDefinition::from_yaml(
            "model: M\nfield: s\ntransitions:\n  - name: reset\n    target: a\n",
        )
        .unwrap();
        assert_eq!(def.transitions[0].source.to_spec(), SourceSpec::Any);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MachineDefinition::from_yaml("model: M\nfield: s\ntransitions: []\ncolour: red\n");
        assert!(err.is_err());
    }

    #[test]
    fn problems_are_collected() {
        let def = MachineDefinition::from_yaml(
            r#"
model: M
field: s
initial: limbo
states: [a, b, a]
transitions:
  - { name: go, source: [a, c], target: b }
  - { name: go, source: a, target: b, return_value: [a] }
  - { name: fail, source: "*", target: a, on_error: broken }
"#,
        )
        .unwrap();
        let problems = def.problems();
        assert!(problems.contains(&"initial state 'limbo' is not a declared text state".to_string()));
        assert!(problems.contains(&"source of 'go' 'c' is not a declared text state".to_string()));
        assert!(problems.contains(&"error state of 'fail' 'broken' is not a declared text state".to_string()));
        assert!(problems.contains(&"state 'a' is declared twice".to_string()));
        assert!(problems.contains(&"transition 'go' declares source 'a' more than once".to_string()));
        assert!(problems.contains(&"transition 'go' declares both target and return_value".to_string()));
        assert!(def.build().is_err());
    }

    #[test]
    fn one_name_may_cover_several_sources() {
        let def = MachineDefinition::from_yaml(
            r#"
model: Ticket
field: status
states: [open, waiting, closed, archived]
transitions:
  - { name: close, source: open, target: closed }
  - { name: close, source: waiting, target: archived }
"#,
        )
        .unwrap();
        assert!(def.problems().is_empty(), "{:?}", def.problems());
        let machine = def.build().unwrap();
        assert_eq!(machine.registry().len(), 1);

        let mut waiting = def
            .document(&machine, Some(StateValue::from("waiting")))
            .unwrap();
        machine
            .call(&mut waiting, "close", statefield_machine::Invocation::new())
            .unwrap();
        assert_eq!(waiting.state.get(), "archived");
    }

    #[test]
    fn integer_definitions() {
        let def = MachineDefinition::from_yaml(
            "model: Task\nfield: priority\nkind: integer\nstates: [1, 2, 3]\ntransitions:\n  - { name: escalate, source: [1, 2], target: 3 }\n",
        )
        .unwrap();
        assert!(def.problems().is_empty());
        assert_eq!(def.parse_state("2").unwrap(), StateValue::from(2));
        assert!(def.parse_state("two").is_err());
        assert_eq!(def.transitions[0].source.to_spec(), SourceSpec::states([1i64, 2]));
    }

    #[test]
    fn built_machine_runs_documents() {
        let def = MachineDefinition::from_yaml(BLOG).unwrap();
        let machine = def.build().unwrap();
        assert_eq!(machine.model(), "BlogPost");
        assert!(machine.field().is_protected());

        let mut doc = def.document(&machine, None).unwrap();
        assert!(machine
            .call(&mut doc, "publish", statefield_machine::Invocation::new())
            .unwrap_err()
            .is_not_allowed());
        doc.flags.insert("has_title".into());
        machine
            .call(&mut doc, "publish", statefield_machine::Invocation::new())
            .unwrap();
        assert_eq!(doc.state.get(), "published");
        assert_eq!(
            machine.transition_for(&doc, "hide").unwrap().custom_value("label"),
            Some(&Value::from("Hide"))
        );
    }
}
