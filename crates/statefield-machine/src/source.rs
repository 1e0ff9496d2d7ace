//! # Source Matching
//!
//! Decides whether a transition's declared source accepts a record's
//! current state.
//!
//! ## Source forms
//!
//! ```text
//! "draft"            exact state
//! ["draft", "new"]   any member of the set
//! "*"                every state
//! "+"                every state except the transition's target
//! "WRK-*"            every text state starting with "WRK-"
//! ```
//!
//! Prefix patterns are recognised only with the `-*` suffix. `"CAT/*"` is
//! an ordinary exact state. The comparison is a plain string prefix test;
//! `"WRK-*"` and `"WRK-REP-*"` may coexist without segment counting.

use serde::{Deserialize, Serialize};
use statefield_core::StateValue;

const ANY: &str = "*";
const ANY_EXCEPT_TARGET: &str = "+";
const PREFIX_MARKER: &str = "-*";

/// The states from which a transition may fire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// Any member of an ordered set of states.
    States(Vec<StateValue>),
    /// Every state.
    Any,
    /// Every state except the transition's static target.
    AnyExceptTarget,
    /// Every text state starting with this literal prefix.
    Prefix(String),
}

impl SourceSpec {
    /// Parse the textual source notation.
    pub fn parse(notation: &str) -> Self {
        match notation {
            ANY => Self::Any,
            ANY_EXCEPT_TARGET => Self::AnyExceptTarget,
            s if s.len() > PREFIX_MARKER.len() && s.ends_with(PREFIX_MARKER) => {
                Self::Prefix(s[..s.len() - 1].to_string())
            }
            s => Self::States(vec![StateValue::from(s)]),
        }
    }

    /// A single exact state.
    pub fn state(value: impl Into<StateValue>) -> Self {
        Self::States(vec![value.into()])
    }

    /// An ordered set of exact states.
    pub fn states<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
    {
        let mut set: Vec<StateValue> = Vec::new();
        for value in values {
            let value = value.into();
            if !set.contains(&value) {
                set.push(value);
            }
        }
        Self::States(set)
    }

    /// A prefix pattern. `prefix` is the literal text states must start
    /// with, e.g. `"WRK-"`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Whether `current` is accepted.
    ///
    /// `target` is the transition's statically known target. When it is
    /// `None` (dynamic or unchanged targets) `AnyExceptTarget` accepts every
    /// state.
    pub fn matches(&self, current: &StateValue, target: Option<&StateValue>) -> bool {
        match self {
            Self::States(states) => states.contains(current),
            Self::Any => true,
            Self::AnyExceptTarget => target.map_or(true, |t| t != current),
            Self::Prefix(prefix) => current
                .as_text()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }

    /// Whether two sources declared on one transition claim a common state
    /// at the same lookup precedence.
    pub fn overlaps(&self, other: &SourceSpec) -> bool {
        match (self, other) {
            (Self::States(a), Self::States(b)) => a.iter().any(|state| b.contains(state)),
            (Self::Any, Self::Any) | (Self::AnyExceptTarget, Self::AnyExceptTarget) => true,
            (Self::Prefix(a), Self::Prefix(b)) => a == b,
            _ => false,
        }
    }

    /// Lookup precedence among the sources of one transition: exact states,
    /// then prefixes (longest first), then `*`, then `+`.
    pub fn precedence(&self) -> (u8, usize) {
        match self {
            Self::States(_) => (3, 0),
            Self::Prefix(prefix) => (2, prefix.len()),
            Self::Any => (1, 0),
            Self::AnyExceptTarget => (0, 0),
        }
    }

    /// Whether this source is a wildcard rather than an explicit set.
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::States(_))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::States(states) => {
                let names: Vec<String> = states.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(", "))
            }
            Self::Any => f.write_str(ANY),
            Self::AnyExceptTarget => f.write_str(ANY_EXCEPT_TARGET),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

impl From<&str> for SourceSpec {
    fn from(notation: &str) -> Self {
        Self::parse(notation)
    }
}

impl From<i64> for SourceSpec {
    fn from(n: i64) -> Self {
        Self::state(n)
    }
}

impl From<StateValue> for SourceSpec {
    fn from(value: StateValue) -> Self {
        match value {
            StateValue::Text(s) => Self::parse(&s),
            StateValue::Int(n) => Self::state(n),
        }
    }
}

impl<const N: usize> From<[&str; N]> for SourceSpec {
    fn from(states: [&str; N]) -> Self {
        Self::states(states)
    }
}

impl<const N: usize> From<[i64; N]> for SourceSpec {
    fn from(states: [i64; N]) -> Self {
        Self::states(states)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(v: &str) -> StateValue {
        StateValue::from(v)
    }

    #[test]
    fn parse_recognises_wildcards() {
        assert_eq!(SourceSpec::parse("*"), SourceSpec::Any);
        assert_eq!(SourceSpec::parse("+"), SourceSpec::AnyExceptTarget);
        assert_eq!(SourceSpec::parse("WRK-*"), SourceSpec::prefix("WRK-"));
        assert_eq!(SourceSpec::parse("draft"), SourceSpec::state("draft"));
    }

    #[test]
    fn non_dash_star_is_literal() {
        let spec = SourceSpec::parse("CAT/*");
        assert_eq!(spec, SourceSpec::state("CAT/*"));
        assert!(!spec.matches(&s("CAT/SUB/STA"), None));
        assert!(spec.matches(&s("CAT/*"), None));
    }

    #[test]
    fn bare_marker_is_literal() {
        assert_eq!(SourceSpec::parse("-*"), SourceSpec::state("-*"));
    }

    #[test]
    fn set_membership() {
        let spec = SourceSpec::from(["new", "draft", "new"]);
        assert_eq!(spec, SourceSpec::states(["new", "draft"]));
        assert!(spec.matches(&s("draft"), None));
        assert!(!spec.matches(&s("published"), None));
    }

    #[test]
    fn any_except_target_uses_static_target() {
        let spec = SourceSpec::AnyExceptTarget;
        let removed = s("removed");
        assert!(spec.matches(&s("new"), Some(&removed)));
        assert!(!spec.matches(&removed, Some(&removed)));
        assert!(spec.matches(&removed, None));
    }

    #[test]
    fn prefix_patterns_of_different_depths() {
        let one = SourceSpec::parse("WRK-*");
        let two = SourceSpec::parse("WRK-REP-*");
        assert!(one.matches(&s("WRK-REP-PRG"), None));
        assert!(one.matches(&s("WRK-INS-PRG"), None));
        assert!(two.matches(&s("WRK-REP-PRG"), None));
        assert!(!two.matches(&s("WRK-INS-PRG"), None));
        assert!(!one.matches(&s("CMP-STD-DON"), None));
        assert!(!one.matches(&s("WRK"), None));
    }

    #[test]
    fn prefix_never_matches_integers() {
        assert!(!SourceSpec::prefix("1").matches(&StateValue::from(10), None));
    }

    #[test]
    fn integer_sources() {
        let spec = SourceSpec::from([1i64, 2]);
        assert!(spec.matches(&StateValue::from(2), None));
        assert!(!spec.matches(&s("2"), None));
    }

    #[test]
    fn display_round_trips_notation() {
        for notation in ["*", "+", "WRK-*", "draft"] {
            assert_eq!(SourceSpec::parse(notation).to_string(), notation);
        }
        assert_eq!(SourceSpec::states(["a", "b"]).to_string(), "a, b");
    }

    #[test]
    fn overlap_is_per_precedence_level() {
        let draft = SourceSpec::states(["new", "draft"]);
        assert!(draft.overlaps(&SourceSpec::state("draft")));
        assert!(!draft.overlaps(&SourceSpec::state("hidden")));
        assert!(SourceSpec::Any.overlaps(&SourceSpec::parse("*")));
        assert!(SourceSpec::parse("WRK-*").overlaps(&SourceSpec::parse("WRK-*")));
        assert!(!SourceSpec::parse("WRK-*").overlaps(&SourceSpec::parse("WRK-REP-*")));
        assert!(!SourceSpec::Any.overlaps(&SourceSpec::AnyExceptTarget));
        assert!(!draft.overlaps(&SourceSpec::Any));
    }

    #[test]
    fn precedence_orders_exact_prefix_any_except() {
        let mut sources = vec![
            SourceSpec::AnyExceptTarget,
            SourceSpec::parse("WRK-*"),
            SourceSpec::Any,
            SourceSpec::state("WRK-REP-PRG"),
            SourceSpec::parse("WRK-REP-*"),
        ];
        sources.sort_by_key(|source| std::cmp::Reverse(source.precedence()));
        let order: Vec<String> = sources.iter().map(ToString::to_string).collect();
        assert_eq!(order, ["WRK-REP-PRG", "WRK-REP-*", "WRK-*", "*", "+"]);
    }

    proptest! {
        /// `matches` agrees with the declarative definition of every form.
        #[test]
        fn matches_follows_definition(
            set in prop::collection::vec("[a-c]{1,3}", 0..4),
            current in "[a-c]{1,3}",
            target in proptest::option::of("[a-c]{1,3}"),
            prefix in "[a-c]{0,2}",
        ) {
            let current = s(&current);
            let target = target.map(|t| s(&t));
            let states: Vec<StateValue> = set.iter().map(|v| s(v)).collect();

            prop_assert_eq!(
                SourceSpec::states(states.clone()).matches(&current, target.as_ref()),
                states.contains(&current)
            );
            prop_assert!(SourceSpec::Any.matches(&current, target.as_ref()));
            prop_assert_eq!(
                SourceSpec::AnyExceptTarget.matches(&current, target.as_ref()),
                target.as_ref() != Some(&current)
            );
            let text = current.as_text().unwrap_or_default().to_string();
            prop_assert_eq!(
                SourceSpec::prefix(prefix.clone()).matches(&current, target.as_ref()),
                text.starts_with(&prefix)
            );
        }
    }
}
