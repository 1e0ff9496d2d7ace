//! # Target Resolution
//!
//! Computes the concrete state a transition moves to once its method has
//! returned.
//!
//! - `Fixed` ignores the method's output.
//! - `ReturnValue` uses the method's output as the new state.
//! - `Computed` calls an auxiliary resolver with the record and the same
//!   invocation the method received.
//! - `Unchanged` runs the transition without moving the state.
//!
//! Dynamic targets are checked against their allow-list. An empty allow-list
//! accepts any state value.

use std::sync::Arc;

use serde_json::Value;
use statefield_core::StateValue;

use crate::invocation::Invocation;

/// Auxiliary resolver for computed targets.
pub type StateResolver<M> = Arc<dyn Fn(&M, &Invocation) -> StateValue + Send + Sync>;

/// How the post-transition state is determined.
pub enum TargetSpec<M> {
    /// A fixed state.
    Fixed(StateValue),
    /// Leave the state as it is.
    Unchanged,
    /// Use the method's return value.
    ReturnValue {
        /// Accepted values; empty accepts any state value.
        allowed: Vec<StateValue>,
    },
    /// Use the value computed by an auxiliary resolver.
    Computed {
        /// Accepted values; empty accepts any state value.
        allowed: Vec<StateValue>,
        /// The resolver.
        resolve: StateResolver<M>,
    },
}

/// A dynamic target produced a value outside its allow-list.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedState {
    /// The produced value.
    pub value: Value,
    /// The allow-list it failed.
    pub allowed: Vec<StateValue>,
}

impl<M> TargetSpec<M> {
    /// A fixed target.
    pub fn fixed(value: impl Into<StateValue>) -> Self {
        Self::Fixed(value.into())
    }

    /// Use the method's return value, restricted to `allowed`.
    pub fn return_value<I, V>(allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
    {
        Self::ReturnValue {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Use a resolver's value, restricted to `allowed`.
    pub fn computed<I, V, F>(allowed: I, resolve: F) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
        F: Fn(&M, &Invocation) -> StateValue + Send + Sync + 'static,
    {
        Self::Computed {
            allowed: allowed.into_iter().map(Into::into).collect(),
            resolve: Arc::new(resolve),
        }
    }

    /// The target when it is known before the method runs.
    pub fn static_value(&self) -> Option<&StateValue> {
        match self {
            Self::Fixed(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the target is only known after the method runs.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::ReturnValue { .. } | Self::Computed { .. })
    }

    /// Every state this target can possibly produce, when that set is
    /// finite and known.
    pub fn possible_states(&self) -> Option<Vec<StateValue>> {
        match self {
            Self::Fixed(value) => Some(vec![value.clone()]),
            Self::Unchanged => Some(Vec::new()),
            Self::ReturnValue { allowed } | Self::Computed { allowed, .. } => {
                (!allowed.is_empty()).then(|| allowed.clone())
            }
        }
    }

    /// Resolve the concrete target for one invocation.
    ///
    /// Returns `Ok(None)` for `Unchanged`.
    pub fn resolve(
        &self,
        record: &M,
        output: &Value,
        invocation: &Invocation,
    ) -> Result<Option<StateValue>, RejectedState> {
        match self {
            Self::Fixed(value) => Ok(Some(value.clone())),
            Self::Unchanged => Ok(None),
            Self::ReturnValue { allowed } => match StateValue::from_json(output) {
                Some(state) if admitted(allowed, &state) => Ok(Some(state)),
                _ => Err(RejectedState {
                    value: output.clone(),
                    allowed: allowed.clone(),
                }),
            },
            Self::Computed { allowed, resolve } => {
                let state = resolve(record, invocation);
                if admitted(allowed, &state) {
                    Ok(Some(state))
                } else {
                    Err(RejectedState {
                        value: state.to_json(),
                        allowed: allowed.clone(),
                    })
                }
            }
        }
    }

    /// Re-home this target onto a record type that embeds `M`.
    pub(crate) fn lift<D: 'static>(&self, view: fn(&D) -> &M) -> TargetSpec<D>
    where
        M: 'static,
    {
        match self {
            Self::Fixed(value) => TargetSpec::Fixed(value.clone()),
            Self::Unchanged => TargetSpec::Unchanged,
            Self::ReturnValue { allowed } => TargetSpec::ReturnValue {
                allowed: allowed.clone(),
            },
            Self::Computed { allowed, resolve } => {
                let resolve = Arc::clone(resolve);
                TargetSpec::Computed {
                    allowed: allowed.clone(),
                    resolve: Arc::new(move |record: &D, invocation: &Invocation| {
                        resolve(view(record), invocation)
                    }),
                }
            }
        }
    }
}

fn admitted(allowed: &[StateValue], state: &StateValue) -> bool {
    allowed.is_empty() || allowed.contains(state)
}

impl<M> Clone for TargetSpec<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Unchanged => Self::Unchanged,
            Self::ReturnValue { allowed } => Self::ReturnValue {
                allowed: allowed.clone(),
            },
            Self::Computed { allowed, resolve } => Self::Computed {
                allowed: allowed.clone(),
                resolve: Arc::clone(resolve),
            },
        }
    }
}

impl<M> std::fmt::Debug for TargetSpec<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Unchanged => f.write_str("Unchanged"),
            Self::ReturnValue { allowed } => f
                .debug_struct("ReturnValue")
                .field("allowed", allowed)
                .finish(),
            Self::Computed { allowed, .. } => f
                .debug_struct("Computed")
                .field("allowed", allowed)
                .finish_non_exhaustive(),
        }
    }
}

impl<M> std::fmt::Display for TargetSpec<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let list = |allowed: &[StateValue]| {
            allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ")
        };
        match self {
            Self::Fixed(value) => write!(f, "{value}"),
            Self::Unchanged => f.write_str("(unchanged)"),
            Self::ReturnValue { allowed } if allowed.is_empty() => f.write_str("(return value)"),
            Self::ReturnValue { allowed } => write!(f, "({})", list(allowed)),
            Self::Computed { allowed, .. } if allowed.is_empty() => f.write_str("(computed)"),
            Self::Computed { allowed, .. } => write!(f, "({})", list(allowed)),
        }
    }
}

impl<M> From<&str> for TargetSpec<M> {
    fn from(value: &str) -> Self {
        Self::fixed(value)
    }
}

impl<M> From<i64> for TargetSpec<M> {
    fn from(value: i64) -> Self {
        Self::fixed(value)
    }
}

impl<M> From<StateValue> for TargetSpec<M> {
    fn from(value: StateValue) -> Self {
        Self::Fixed(value)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
