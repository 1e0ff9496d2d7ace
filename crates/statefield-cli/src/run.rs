//! # Run Subcommand
//!
//! Simulates one transition on a document and reports the resulting state,
//! or the error the executor raised and the state the document was left in.
//!
//! When capabilities are given, the permission is checked before the call,
//! the way an interactive caller would check it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use statefield_core::{StateValue, TransitionError};
use statefield_machine::{Capabilities, Invocation};

use crate::Simulation;

/// Arguments for the `statefield run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Machine definition (YAML).
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,

    /// Transition to run.
    #[arg(long)]
    pub transition: String,

    /// Current state. Defaults to the definition's initial state.
    #[arg(long)]
    pub state: Option<String>,

    /// Condition flag set on the document. Repeatable.
    #[arg(long = "flag", value_name = "FLAG")]
    pub flags: Vec<String>,

    /// Capability held by the acting principal. Repeatable. When given,
    /// the transition's permission is enforced.
    #[arg(long = "capability", value_name = "CAPABILITY")]
    pub capabilities: Vec<String>,

    /// Value the method returns (JSON, or a bare string).
    #[arg(long)]
    pub result: Option<String>,

    /// Make the method fail.
    #[arg(long)]
    pub fail: bool,

    /// Who triggers the transition.
    #[arg(long)]
    pub by: Option<String>,

    /// Why the transition is triggered.
    #[arg(long)]
    pub description: Option<String>,
}

/// The outcome of a simulated call.
#[derive(Debug)]
pub struct RunOutcome {
    /// State before the call.
    pub source: StateValue,
    /// State after the call.
    pub state: StateValue,
    /// The executor's error, if the call failed.
    pub error: Option<TransitionError>,
    /// The call was refused by the permission check and never made.
    pub denied: bool,
}

impl RunOutcome {
    /// Whether the transition succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.denied
    }
}

/// Parse `--result`: JSON when it parses, otherwise a bare string.
pub fn parse_result(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Run the simulation.
pub fn simulate(
    simulation: &mut Simulation,
    transition: &str,
    capabilities: &[String],
    invocation: Invocation,
) -> Result<RunOutcome> {
    let machine = &simulation.machine;
    let source = machine.state(&simulation.document)?.clone();

    if !capabilities.is_empty() {
        let principal = Capabilities::new(capabilities.iter().cloned());
        // A refused source falls through to the call, which reports it.
        match machine.transition_for(&simulation.document, transition) {
            Ok(descriptor) if !descriptor.has_perm(&simulation.document, &principal) => {
                return Ok(RunOutcome {
                    state: source.clone(),
                    source,
                    error: None,
                    denied: true,
                });
            }
            Ok(_) => {}
            Err(error) if error.is_not_allowed() => {}
            Err(error) => return Err(error.into()),
        }
    }

    let error = machine
        .call(&mut simulation.document, transition, invocation)
        .err();
    Ok(RunOutcome {
        source,
        state: machine.state(&simulation.document)?.clone(),
        error,
        denied: false,
    })
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 when the transition succeeded, 1 otherwise.
pub fn run_run(args: &RunArgs) -> Result<u8> {
    let mut simulation = Simulation::load(&args.definition, args.state.as_deref(), &args.flags)?;
    simulation.document.fail = args.fail;
    if let Some(result) = &args.result {
        simulation.document.result = parse_result(result);
    }

    simulation.machine.signals().connect_after(|event| {
        tracing::info!(
            transition = event.transition,
            source = %event.source,
            target = ?event.target.map(ToString::to_string),
            failed = event.is_failure(),
            "after transition"
        );
    });

    let mut invocation = Invocation::new();
    if let Some(by) = &args.by {
        invocation = invocation.by(by.clone());
    }
    if let Some(description) = &args.description {
        invocation = invocation.description(description.clone());
    }

    let outcome = simulate(&mut simulation, &args.transition, &args.capabilities, invocation)?;
    if outcome.denied {
        println!("DENIED: {} requires a permission the principal lacks", args.transition);
    } else if let Some(error) = &outcome.error {
        println!("FAIL: {error}");
    } else {
        println!("OK: {}", args.transition);
    }
    println!("{} -> {}", outcome.source, outcome.state);

    Ok(if outcome.succeeded() { 0 } else { 1 })
}
