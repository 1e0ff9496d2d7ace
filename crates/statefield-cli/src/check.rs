//! # Check Subcommand
//!
//! Validates a machine definition and prints a summary of its field and
//! transitions.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::definition::MachineDefinition;

/// Arguments for the `statefield check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Machine definition (YAML).
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 when the definition is valid, 1 otherwise.
pub fn run_check(args: &CheckArgs) -> Result<u8> {
    let definition = match MachineDefinition::load(&args.definition) {
        Ok(definition) => definition,
        Err(e) => {
            println!("FAIL: {e:#}");
            return Ok(1);
        }
    };
    let machine = definition.build()?;
    for line in summary(&definition) {
        println!("{line}");
    }
    tracing::info!(
        model = machine.model(),
        transitions = machine.registry().len(),
        "definition is valid"
    );
    Ok(0)
}

/// Human-readable description of a valid definition.
pub fn summary(definition: &MachineDefinition) -> Vec<String> {
    let states = if definition.states.is_empty() {
        format!("any {} state", definition.kind)
    } else {
        format!("{} states", definition.states.len())
    };
    let names: BTreeSet<&str> = definition.transitions.iter().map(|t| t.name.as_str()).collect();
    let mut lines = vec![format!(
        "{}.{}: {}, {} transitions{}",
        definition.model,
        definition.field,
        states,
        names.len(),
        if definition.protected { " (protected)" } else { "" }
    )];
    for t in &definition.transitions {
        let target = match (&t.target, &t.return_value) {
            (Some(target), _) => target.to_string(),
            (None, Some(allowed)) if allowed.is_empty() => "(return value)".into(),
            (None, Some(allowed)) => format!(
                "({})",
                allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(" | ")
            ),
            (None, None) => "(unchanged)".into(),
        };
        let mut line = format!("  {}: {} -> {}", t.name, t.source.to_spec(), target);
        if let Some(error_state) = &t.on_error {
            line.push_str(&format!(" [on_error: {error_state}]"));
        }
        if !t.conditions.is_empty() {
            line.push_str(&format!(" [conditions: {}]", t.conditions.join(", ")));
        }
        if let Some(permission) = &t.permission {
            line.push_str(&format!(" [permission: {permission}]"));
        }
        lines.push(line);
    }
    lines
}
