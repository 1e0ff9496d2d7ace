//! # statefield-store: Persistence Boundary
//!
//! An in-memory, thread-safe record store that completes the optimistic
//! concurrency contract of statefield records: it captures each state cell's
//! load-time snapshot, refuses saves whose guarded fields drifted in storage
//! (`ConcurrentTransition`), refreshes protected fields through the
//! sanctioned refresh scope, and rolls back every write of a failed
//! transaction.
//!
//! ## Usage
//!
//! ```text
//! let mut post = store.load(&id)?;                  // snapshot captured
//! MACHINE.call(&mut post, "publish", Invocation::new())?;
//! store.save(&mut post)?;                           // conditional update
//! ```
//!
//! Wrap load, transition and save in [`Store::transaction`] to make a
//! multi-record change all-or-nothing.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{Record, Store, Transaction};
