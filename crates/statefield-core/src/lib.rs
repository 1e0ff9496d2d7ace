//! # statefield-core: Foundational Types
//!
//! This crate is the leaf of the statefield workspace. It defines the value
//! types every other crate speaks in: the state values stored on a record,
//! the canonical identifier of a state field, the domain a field's values are
//! drawn from, and the error taxonomy raised by transitions.
//!
//! ## Key Design Principles
//!
//! 1. **One state value type.** `StateValue` covers the two domains a state
//!    field can hold (text and integer). Equality is exact equality of the
//!    underlying primitive; no ordering is implied.
//!
//! 2. **One canonical field identifier.** `FieldId` is an interned symbol.
//!    Fields are referenced by `FieldId` everywhere, never by loose strings
//!    at one call site and field objects at another.
//!
//! 3. **Structured errors.** Every failure names the transition, the field
//!    and the state it happened in.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `statefield-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod field;
pub mod state;

// Re-export primary types for ergonomic imports.
pub use error::{
    AccessError, ConcurrentTransition, DeclarationError, NotAllowedKind, TransitionError,
};
pub use field::{Admissible, FieldId, StateChoice, StateDomain, StateKind};
pub use state::StateValue;
