//! # statefield-machine: Declarative State Machines for Record Fields
//!
//! Lets a field on a record hold a state value, and lets operations on the
//! record be declared as transitions that are only permitted from certain
//! source states to certain target states, subject to side-effect-free
//! conditions and access-control checks.
//!
//! ## Architecture
//!
//! ```text
//! TransitionBuilder ──▶ TransitionDescriptor ──▶ TransitionRegistry ──▶ Machine
//!                          (immutable, Arc)        (per type, field)      │
//!                                                                         ├─ call()       executor
//!                                                                         ├─ can_proceed()
//!                                                                         ├─ available_transitions()
//!                                                                         └─ signals()    before / after hooks
//! ```
//!
//! A record type implements [`Stateful`] to expose its [`StateCell`]s. The
//! machine reads and commits state only through those cells; protected
//! cells refuse every other write except a scoped refresh.
//!
//! ## Example
//!
//! ```
//! use statefield_core::FieldId;
//! use statefield_machine::{Invocation, Machine, StateCell, StateField, Stateful, TransitionDescriptor};
//!
//! const STATE: FieldId = FieldId::new("state");
//!
//! struct Post { state: StateCell }
//!
//! impl Stateful for Post {
//!     fn state_fields(&self) -> Vec<FieldId> { vec![STATE] }
//!     fn state_cell(&self, f: FieldId) -> Option<&StateCell> { (f == STATE).then_some(&self.state) }
//!     fn state_cell_mut(&mut self, f: FieldId) -> Option<&mut StateCell> { (f == STATE).then_some(&mut self.state) }
//! }
//!
//! let machine: Machine<Post> = Machine::builder(StateField::new(STATE).protected())
//!     .transition(TransitionDescriptor::builder("publish").source("new").target("published"))
//!     .build()
//!     .unwrap();
//!
//! let mut post = Post { state: machine.new_cell("new") };
//! machine.call(&mut post, "publish", Invocation::new()).unwrap();
//! assert_eq!(post.state.get(), "published");
//! assert!(post.state.set("new").is_err());
//! ```
//!
//! ## Crate Policy
//!
//! - Method bodies, conditions and callbacks return `anyhow::Result`; their
//!   errors reach the caller unchanged inside `TransitionError`.
//! - No `unsafe` code.

pub mod cell;
pub mod descriptor;
pub mod executor;
pub mod invocation;
pub mod machine;
pub mod principal;
pub mod registry;
pub mod signal;
pub mod source;
pub mod target;

pub use cell::{RefreshScope, StateCell, Stateful};
pub use descriptor::{Completed, Condition, TransitionBuilder, TransitionDescriptor};
pub use executor::Checks;
pub use invocation::Invocation;
pub use machine::{ConditionErrorPolicy, Machine, MachineBuilder, MachineOptions, StateField};
pub use principal::{Capabilities, Permission, Principal};
pub use registry::TransitionRegistry;
pub use signal::{Phase, Signals, TransitionEvent};
pub use source::SourceSpec;
pub use target::{RejectedState, TargetSpec};
