//! # statefield-cli: Command-Line Interface
//!
//! Provides the `statefield` binary for working with declarative machine
//! definitions without writing a record type.
//!
//! ## Subcommands
//!
//! - `statefield check`: Validate a definition and summarise it.
//! - `statefield transitions`: List all, available and permitted
//!   transitions from a state.
//! - `statefield run`: Simulate one transition and report the outcome.
//!
//! ```bash
//! statefield check machines/blog_post.yaml
//! statefield transitions machines/blog_post.yaml --state new --flag has_title --json
//! statefield run machines/blog_post.yaml --state new --transition publish --flag has_title --fail
//! ```
//!
//! ## Crate Policy
//!
//! - Argument parsing lives next to each handler; `main.rs` only dispatches.
//! - Handlers return an exit code; operational errors propagate as
//!   `anyhow::Error`.

pub mod check;
pub mod definition;
pub mod run;
pub mod transitions;

use std::path::Path;

use anyhow::Result;
use statefield_machine::Machine;

use crate::definition::{Document, MachineDefinition};

/// A loaded definition, its machine, and a document to simulate on.
pub struct Simulation {
    /// The parsed definition.
    pub definition: MachineDefinition,
    /// The machine built from it.
    pub machine: Machine<Document>,
    /// The document, in the requested state with the requested flags.
    pub document: Document,
}

impl Simulation {
    /// Load `path` and prepare a document in `state` (or the initial state)
    /// carrying `flags`.
    pub fn load(path: &Path, state: Option<&str>, flags: &[String]) -> Result<Self> {
        Self::from_definition(MachineDefinition::load(path)?, state, flags)
    }

    /// Prepare a simulation from an already parsed definition.
    pub fn from_definition(
        definition: MachineDefinition,
        state: Option<&str>,
        flags: &[String],
    ) -> Result<Self> {
        let machine = definition.build()?;
        let state = state.map(|s| definition.parse_state(s)).transpose()?;
        let mut document = definition.document(&machine, state)?;
        document.flags.extend(flags.iter().cloned());
        Ok(Self {
            definition,
            machine,
            document,
        })
    }
}
