//! # State Values
//!
//! A `StateValue` is the raw value a state field holds on a record. It is
//! either text (`"draft"`, `"WRK-REP-PRG"`) or an integer (`1`, `2`).
//!
//! Text and integer values never compare equal to each other: `"1"` and `1`
//! are distinct states.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::StateKind;

/// The value of a state field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Integer-domain state.
    Int(i64),
    /// Text-domain state.
    Text(String),
}

impl StateValue {
    /// Create a text state.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Access the text form, if this is a text state.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    /// Access the integer form, if this is an integer state.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// The domain kind this value belongs to.
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Int(_) => StateKind::Integer,
            Self::Text(_) => StateKind::Text,
        }
    }

    /// Interpret a JSON value as a state.
    ///
    /// Strings become text states and integral numbers become integer
    /// states. Everything else (null, floats, arrays, objects, booleans)
    /// has no state interpretation.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Int),
            _ => None,
        }
    }

    /// The JSON form of this state.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for StateValue {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for StateValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&StateValue> for StateValue {
    fn from(v: &StateValue) -> Self {
        v.clone()
    }
}

impl PartialEq<str> for StateValue {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

impl PartialEq<&str> for StateValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<i64> for StateValue {
    fn eq(&self, other: &i64) -> bool {
        self.as_int() == Some(*other)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_integer_never_equal() {
        assert_ne!(StateValue::from("1"), StateValue::from(1));
        assert_eq!(StateValue::from("1"), "1");
        assert_eq!(StateValue::from(1), 1i64);
    }

    #[test]
    fn display_uses_raw_value() {
        assert_eq!(StateValue::from("draft").to_string(), "draft");
        assert_eq!(StateValue::from(42).to_string(), "42");
    }

    #[test]
    fn from_json_accepts_strings_and_integers_only() {
        assert_eq!(
            StateValue::from_json(&serde_json::json!("published")),
            Some(StateValue::from("published"))
        );
        assert_eq!(
            StateValue::from_json(&serde_json::json!(3)),
            Some(StateValue::from(3))
        );
        assert_eq!(StateValue::from_json(&serde_json::json!(3.5)), None);
        assert_eq!(StateValue::from_json(&Value::Null), None);
        assert_eq!(StateValue::from_json(&serde_json::json!(true)), None);
    }

    #[test]
    fn serde_is_untagged() {
        let json = serde_json::to_string(&StateValue::from("new")).unwrap();
        assert_eq!(json, "\"new\"");
        let parsed: StateValue = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, StateValue::Int(7));
        let parsed: StateValue = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(parsed, StateValue::text("7"));
    }

    #[test]
    fn kind_follows_variant() {
        assert_eq!(StateValue::from("x").kind(), StateKind::Text);
        assert_eq!(StateValue::from(0).kind(), StateKind::Integer);
    }
}
