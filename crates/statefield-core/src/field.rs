//! # State Fields: Canonical Identifiers and Domains
//!
//! A record may carry several state fields. Each is referenced by exactly
//! one `FieldId`, an interned symbol resolved once when a machine is
//! declared. There is no second lookup path by loose string.
//!
//! A `StateDomain` describes which values a field may hold: its kind (text
//! or integer) and, optionally, an explicit list of labelled choices.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::state::StateValue;

static INTERNED: Mutex<BTreeSet<&'static str>> = parking_lot::const_mutex(BTreeSet::new());

/// Canonical identifier of a state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldId(&'static str);

impl FieldId {
    /// Declare a field identifier from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Intern a field name known only at runtime (e.g. read from a
    /// machine definition file). Repeated calls with the same name return
    /// identifiers that compare equal and share storage.
    pub fn intern(name: &str) -> Self {
        let mut interned = INTERNED.lock();
        if let Some(existing) = interned.get(name) {
            return Self(existing);
        }
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        interned.insert(leaked);
        Self(leaked)
    }

    /// The field name.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl<'de> Deserialize<'de> for FieldId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::intern(&name))
    }
}

/// The primitive kind of a state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// String-valued states.
    Text,
    /// Integer-valued states.
    Integer,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Integer => f.write_str("integer"),
        }
    }
}

/// A declared state with a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChoice {
    /// The stored value.
    pub value: StateValue,
    /// Display label.
    pub label: String,
}

/// What a domain accepts, as reported when it rejects a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admissible {
    /// Any state value.
    Any,
    /// Any state value of this kind.
    Kind(StateKind),
    /// One of these states.
    States(Vec<StateValue>),
}

impl std::fmt::Display for Admissible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("any state"),
            Self::Kind(StateKind::Text) => f.write_str("a text state"),
            Self::Kind(StateKind::Integer) => f.write_str("an integer state"),
            Self::States(states) => {
                let names: Vec<String> = states.iter().map(ToString::to_string).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
        }
    }
}

/// The set of values a state field accepts.
///
/// Without a kind, values of either kind are accepted. With no declared
/// choices, any value of the field's kind is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDomain {
    #[serde(default)]
    kind: Option<StateKind>,
    #[serde(default)]
    choices: Vec<StateChoice>,
}

impl StateDomain {
    /// An open domain accepting text and integer states alike.
    pub fn any() -> Self {
        Self::default()
    }

    /// An open text domain.
    pub fn text() -> Self {
        Self {
            kind: Some(StateKind::Text),
            choices: Vec::new(),
        }
    }

    /// An open integer domain.
    pub fn integer() -> Self {
        Self {
            kind: Some(StateKind::Integer),
            choices: Vec::new(),
        }
    }

    /// Add a labelled choice.
    pub fn choice(mut self, value: impl Into<StateValue>, label: impl Into<String>) -> Self {
        self.choices.push(StateChoice {
            value: value.into(),
            label: label.into(),
        });
        self
    }

    /// Add several choices, each labelled with its own display form.
    pub fn choices<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
    {
        for value in values {
            let value = value.into();
            let label = value.to_string();
            self.choices.push(StateChoice { value, label });
        }
        self
    }

    /// The field kind, if the domain is restricted to one.
    pub fn kind(&self) -> Option<StateKind> {
        self.kind
    }

    /// Declared choices, in declaration order.
    pub fn declared(&self) -> &[StateChoice] {
        &self.choices
    }

    /// Declared values, in declaration order.
    pub fn values(&self) -> Vec<StateValue> {
        self.choices.iter().map(|c| c.value.clone()).collect()
    }

    /// Whether `value` belongs to this domain.
    pub fn admits(&self, value: &StateValue) -> bool {
        if self.kind.is_some_and(|kind| kind != value.kind()) {
            return false;
        }
        self.choices.is_empty() || self.choices.iter().any(|c| &c.value == value)
    }

    /// What this domain accepts.
    pub fn admissible(&self) -> Admissible {
        match (&self.kind, self.choices.is_empty()) {
            (_, false) => Admissible::States(self.values()),
            (Some(kind), true) => Admissible::Kind(*kind),
            (None, true) => Admissible::Any,
        }
    }

    /// The label of a declared value.
    pub fn label(&self, value: &StateValue) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| &c.value == value)
            .map(|c| c.label.as_str())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
