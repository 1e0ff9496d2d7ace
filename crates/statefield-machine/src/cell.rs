//! # State Cells: Protected-Field Guard and Concurrency Snapshot
//!
//! A `StateCell` holds the current value of one state field on one record.
//!
//! ## Write paths
//!
//! ```text
//! StateCell::set()          ordinary assignment; refused when protected
//! RefreshScope::assign()    sanctioned reload from storage; always allowed
//! StateCell::commit()       executor commit / error-state application
//! ```
//!
//! `commit` is crate-private: only the transition executor reaches it.
//!
//! ## Load-time snapshot
//!
//! The cell remembers the value it held when the record was last loaded or
//! persisted. Transitions never touch the snapshot; the persistence layer
//! compares it against storage to detect concurrent transitions and resets
//! it after a successful load, refresh or save.

use statefield_core::{AccessError, FieldId, StateValue};

/// The current value of one state field, with its write guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCell {
    field: FieldId,
    value: StateValue,
    protected: bool,
    loaded: StateValue,
    refreshing: bool,
}

impl StateCell {
    /// An unprotected cell.
    pub fn new(field: FieldId, initial: impl Into<StateValue>) -> Self {
        let value = initial.into();
        Self {
            field,
            loaded: value.clone(),
            value,
            protected: false,
            refreshing: false,
        }
    }

    /// A protected cell: only transitions and refreshes may change it.
    pub fn protected(field: FieldId, initial: impl Into<StateValue>) -> Self {
        Self {
            protected: true,
            ..Self::new(field, initial)
        }
    }

    /// The field this cell belongs to.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// The current state.
    pub fn get(&self) -> &StateValue {
        &self.value
    }

    /// Whether direct assignment is refused.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Assign a new state directly, outside any transition.
    ///
    /// # Errors
    ///
    /// `AccessError::DirectAssignment` if the cell is protected and no
    /// refresh is in progress.
    pub fn set(&mut self, value: impl Into<StateValue>) -> Result<(), AccessError> {
        if self.protected && !self.refreshing {
            return Err(AccessError::DirectAssignment { field: self.field });
        }
        self.value = value.into();
        Ok(())
    }

    /// Open a sanctioned refresh. While the returned scope lives, writes
    /// through it bypass protection. The flag is cleared when the scope is
    /// dropped, including on early return or unwinding.
    pub fn refresh(&mut self) -> RefreshScope<'_> {
        self.refreshing = true;
        RefreshScope { cell: self }
    }

    /// Whether a refresh is in progress.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// The value captured when the record was last loaded or persisted.
    pub fn loaded(&self) -> &StateValue {
        &self.loaded
    }

    /// Whether the in-memory value differs from the load-time snapshot.
    pub fn is_dirty(&self) -> bool {
        self.value != self.loaded
    }

    /// Capture the current value as the load-time snapshot.
    ///
    /// Called by the persistence layer after a successful load or save.
    pub fn mark_loaded(&mut self) {
        self.loaded = self.value.clone();
    }

    pub(crate) fn commit(&mut self, value: StateValue) {
        self.value = value;
    }
}

/// A sanctioned refresh-from-storage in progress.
#[derive(Debug)]
pub struct RefreshScope<'a> {
    cell: &'a mut StateCell,
}

impl RefreshScope<'_> {
    /// Overwrite the cell with the stored value and reset its snapshot.
    pub fn assign(&mut self, value: impl Into<StateValue>) -> Result<(), AccessError> {
        self.cell.set(value)?;
        self.cell.mark_loaded();
        Ok(())
    }
}

impl Drop for RefreshScope<'_> {
    fn drop(&mut self) {
        self.cell.refreshing = false;
    }
}

/// A record type carrying one or more state fields.
pub trait Stateful: Sized + 'static {
    /// Every state field the record carries, in declaration order.
    fn state_fields(&self) -> Vec<FieldId>;

    /// The cell of `field`, if the record carries it.
    fn state_cell(&self, field: FieldId) -> Option<&StateCell>;

    /// Mutable access to the cell of `field`.
    fn state_cell_mut(&mut self, field: FieldId) -> Option<&mut StateCell>;
}

// ─── Tests ───────────────────────────────────────────────────────────
