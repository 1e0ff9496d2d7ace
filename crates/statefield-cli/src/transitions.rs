//! # Transitions Subcommand
//!
//! Lists the transitions of a definition as seen from one state: every
//! declared transition, those available right now (source matches and all
//! condition flags are set), and those the given capabilities permit.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use statefield_core::StateValue;
use statefield_machine::Capabilities;

use crate::Simulation;

/// Arguments for the `statefield transitions` subcommand.
#[derive(Args, Debug)]
pub struct TransitionsArgs {
    /// Machine definition (YAML).
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,

    /// Current state. Defaults to the definition's initial state.
    #[arg(long)]
    pub state: Option<String>,

    /// Condition flag set on the document. Repeatable.
    #[arg(long = "flag", value_name = "FLAG")]
    pub flags: Vec<String>,

    /// Capability held by the acting principal. Repeatable.
    #[arg(long = "capability", value_name = "CAPABILITY")]
    pub capabilities: Vec<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// What the transitions subcommand reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReport {
    /// Record type name.
    pub model: String,
    /// State field name.
    pub field: String,
    /// The state examined.
    pub state: StateValue,
    /// One row per declared rule, in declaration order.
    pub transitions: Vec<TransitionRow>,
}

/// One declared rule, as seen from the examined state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRow {
    /// Transition name.
    pub name: String,
    /// Source notation.
    pub source: String,
    /// Target notation.
    pub target: String,
    /// This rule handles the examined state and every condition holds.
    pub available: bool,
    /// Available and permitted for the principal.
    pub permitted: bool,
}

impl TransitionReport {
    /// Names of available transitions.
    pub fn available(&self) -> Vec<&str> {
        self.rows(|row| row.available)
    }

    /// Names of permitted transitions.
    pub fn permitted(&self) -> Vec<&str> {
        self.rows(|row| row.permitted)
    }

    fn rows(&self, keep: impl Fn(&TransitionRow) -> bool) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|row| keep(row))
            .map(|row| row.name.as_str())
            .collect()
    }
}

/// Build the report for a prepared simulation.
pub fn report(simulation: &Simulation, capabilities: &[String]) -> Result<TransitionReport> {
    let machine = &simulation.machine;
    let document = &simulation.document;
    let principal = Capabilities::new(capabilities.iter().cloned());

    let available = machine.available_transitions(document)?;
    let permitted = machine.available_transitions_for(document, &principal)?;
    let transitions = machine
        .all_transitions()
        .map(|t| TransitionRow {
            name: t.name().to_string(),
            source: t.source().to_string(),
            target: t.target().to_string(),
            available: available.iter().any(|a| std::ptr::eq(*a, t)),
            permitted: permitted.iter().any(|p| std::ptr::eq(*p, t)),
        })
        .collect();

    Ok(TransitionReport {
        model: machine.model().to_string(),
        field: machine.field().id().to_string(),
        state: machine.state(document)?.clone(),
        transitions,
    })
}

/// Execute the transitions subcommand.
///
/// Returns exit code 0.
pub fn run_transitions(args: &TransitionsArgs) -> Result<u8> {
    let simulation = Simulation::load(&args.definition, args.state.as_deref(), &args.flags)?;
    let report = report(&simulation, &args.capabilities)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("{}.{} = {}", report.model, report.field, report.state);
    for row in &report.transitions {
        let mark = match (row.available, row.permitted) {
            (true, true) => "+",
            (true, false) => "~",
            (false, _) => " ",
        };
        println!("  {mark} {}: {} -> {}", row.name, row.source, row.target);
    }
    println!("available: {}", report.available().join(", "));
    println!("permitted: {}", report.permitted().join(", "));
    Ok(0)
}
