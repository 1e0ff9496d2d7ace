//! # Store Errors

use statefield_core::{AccessError, ConcurrentTransition, FieldId};
use thiserror::Error;

/// Errors raised at the persistence boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stored state drifted since the record was loaded. Nothing was
    /// written; the caller should discard the record and reload it.
    #[error(transparent)]
    Concurrent(#[from] ConcurrentTransition),

    /// No stored record has this key.
    #[error("{model} {key} not found")]
    NotFound {
        /// Record type name.
        model: String,
        /// Record key, in display form.
        key: String,
    },

    /// A record with this key is already stored.
    #[error("{model} {key} already exists")]
    Duplicate {
        /// Record type name.
        model: String,
        /// Record key, in display form.
        key: String,
    },

    /// A refresh could not write a state cell.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The record type lists a field it does not carry.
    #[error("record has no state field {field}")]
    UnknownField {
        /// State field.
        field: FieldId,
    },
}

impl StoreError {
    /// Whether the caller should reload and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Concurrent(_))
    }
}
