//! # Error Types: Transition Failure Taxonomy
//!
//! Every failure a caller can observe from a transition, a protected-field
//! write, or a conditional save. All errors use `thiserror`.
//!
//! ## Design
//!
//! - Rejections (`NotAllowed`) never leave the record mutated.
//! - Errors raised by user code (method bodies, conditions, callbacks) are
//!   carried as `anyhow::Error` so the caller can downcast to the original
//!   error type.
//! - `ConcurrentTransition` is raised only by the persistence boundary, never
//!   while executing a transition.

use serde_json::Value;
use thiserror::Error;

use crate::field::{Admissible, FieldId};
use crate::state::StateValue;

/// Why a transition was refused before its method ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotAllowedKind {
    /// The current state is not matched by the transition's source.
    InvalidSource,
    /// A condition predicate returned false.
    ConditionNotMet {
        /// Name of the first failing condition.
        condition: String,
    },
}

impl std::fmt::Display for NotAllowedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSource => f.write_str("invalid source"),
            Self::ConditionNotMet { condition } => {
                write!(f, "condition '{condition}' not met")
            }
        }
    }
}

/// Errors raised while executing or querying a transition.
#[derive(Error, Debug)]
pub enum TransitionError {
    /// Source mismatch or unmet condition. The record is untouched.
    #[error("can't run '{transition}' on {field}='{state}': {kind}")]
    NotAllowed {
        /// Transition name.
        transition: String,
        /// State field.
        field: FieldId,
        /// State the record was in.
        state: StateValue,
        /// Rejection reason.
        kind: NotAllowedKind,
    },

    /// A dynamic target produced a value outside its allow-list or the
    /// field's domain.
    #[error("transition '{transition}' resolved to {returned}, which is not {allowed}")]
    InvalidResultState {
        /// Transition name.
        transition: String,
        /// The rejected value, as returned.
        returned: Value,
        /// What would have been accepted.
        allowed: Admissible,
    },

    /// The transition method raised. If an error state is configured the
    /// record has already been moved to it.
    #[error("transition '{transition}' failed")]
    Method {
        /// Transition name.
        transition: String,
        /// The method's own error.
        source: anyhow::Error,
    },

    /// The transition method raised and its configured error state is not a
    /// valid value of the field. The record is untouched.
    #[error("transition '{transition}' failed and its error state '{state}' is not valid for the field")]
    InvalidErrorState {
        /// Transition name.
        transition: String,
        /// The rejected error state.
        state: StateValue,
        /// The method's own error.
        source: anyhow::Error,
    },

    /// A condition predicate raised instead of answering.
    #[error("condition '{condition}' of transition '{transition}' raised")]
    Condition {
        /// Transition name.
        transition: String,
        /// Condition name.
        condition: String,
        /// The predicate's error.
        source: anyhow::Error,
    },

    /// The success callback raised. The state change has been committed.
    #[error("success callback of transition '{transition}' failed")]
    Callback {
        /// Transition name.
        transition: String,
        /// The callback's error.
        source: anyhow::Error,
    },

    /// No transition with this name is registered on the field.
    #[error("no transition named '{name}' on field {field}")]
    UnknownTransition {
        /// State field.
        field: FieldId,
        /// Requested name.
        name: String,
    },

    /// The record has no state cell for the field.
    #[error("record has no state field {field}")]
    UnknownField {
        /// State field.
        field: FieldId,
    },
}

impl TransitionError {
    /// Whether this is a `NotAllowed` rejection.
    pub fn is_not_allowed(&self) -> bool {
        matches!(self, Self::NotAllowed { .. })
    }

    /// The error raised by the transition method, if that is what failed.
    pub fn method_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Method { source, .. } | Self::InvalidErrorState { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A machine declaration that cannot be built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// Two rules of one transition accept the same source.
    #[error("transition '{transition}' declares source '{state}' more than once")]
    DuplicateSource {
        /// Transition name.
        transition: String,
        /// The source, in notation form.
        state: String,
    },

    /// A fixed target or allow-list entry the field can never hold.
    #[error("transition '{transition}' declares state '{state}', which is not {allowed}")]
    OutsideDomain {
        /// Transition name.
        transition: String,
        /// The declared state.
        state: StateValue,
        /// What the field accepts.
        allowed: Admissible,
    },
}

/// Errors raised by the protected-field guard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// A protected state field was assigned outside a transition or refresh.
    #[error("direct {field} modification is not allowed")]
    DirectAssignment {
        /// State field.
        field: FieldId,
    },
}

/// A conditional save found the stored state changed since load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot save {model} {key}: {field} changed since it was loaded (expected '{expected}', found '{found}')")]
pub struct ConcurrentTransition {
    /// Record type name.
    pub model: String,
    /// Record key, in display form.
    pub key: String,
    /// The drifted field.
    pub field: FieldId,
    /// The value captured at load time.
    pub expected: StateValue,
    /// The value currently stored.
    pub found: StateValue,
}

// ─── Tests ───────────────────────────────────────────────────────────
