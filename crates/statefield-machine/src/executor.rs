//! # Transition Executor
//!
//! Runs one transition call on one record.
//!
//! ## Call lifecycle
//!
//! ```text
//! source check ─▶ conditions ─▶ before hook ─▶ method ─┬─▶ resolve target ─▶ commit ─▶ after hook ─▶ on_success
//!                                                      └─▶ (raised) error state ─▶ after hook ─▶ re-raise
//! ```
//!
//! The state cell is written at most once per call: either the resolved
//! target after a successful method, or the error state after a raising
//! one. Rejections and `InvalidResultState` leave the record untouched.

use chrono::Utc;
use serde_json::Value;
use statefield_core::{Admissible, StateValue, TransitionError};

use crate::cell::Stateful;
use crate::descriptor::{Completed, TransitionDescriptor};
use crate::invocation::Invocation;
use crate::machine::Machine;
use crate::signal::{Phase, TransitionEvent};

/// Which checks a call enforces before running the method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Checks {
    /// Source and conditions.
    #[default]
    All,
    /// Source only; conditions are skipped.
    SourceOnly,
}

impl<M: Stateful> Machine<M> {
    /// Run transition `name` on `record`, enforcing source and conditions.
    ///
    /// Returns the method's own return value.
    ///
    /// # Errors
    ///
    /// - `NotAllowed` when the source or a condition rejects the call.
    /// - `Condition` when a condition raises and the policy propagates.
    /// - `Method` when the method raises; the record is in the error state
    ///   if one is configured, otherwise unchanged.
    /// - `InvalidErrorState` when the configured error state is not a valid
    ///   value of the field.
    /// - `InvalidResultState` when a dynamic target is rejected.
    /// - `Callback` when the success callback fails after the commit.
    pub fn call(
        &self,
        record: &mut M,
        name: &str,
        invocation: Invocation,
    ) -> Result<Value, TransitionError> {
        self.call_with(record, name, invocation, Checks::All)
    }

    /// Run transition `name`, choosing which checks to enforce.
    pub fn call_with(
        &self,
        record: &mut M,
        name: &str,
        invocation: Invocation,
        checks: Checks,
    ) -> Result<Value, TransitionError> {
        let descriptor = match self.admit(record, name, checks == Checks::All)? {
            Ok(descriptor) => descriptor,
            Err(kind) => {
                let state = self.state(record)?.clone();
                tracing::debug!(
                    model = self.model(),
                    field = %self.field().id(),
                    transition = name,
                    state = %state,
                    reason = %kind,
                    "transition rejected"
                );
                return Err(self.not_allowed(name, state, kind));
            }
        };
        self.execute(record, descriptor, &invocation)
    }

    fn execute(
        &self,
        record: &mut M,
        descriptor: &TransitionDescriptor<M>,
        invocation: &Invocation,
    ) -> Result<Value, TransitionError> {
        let field = self.field().id();
        let source = self.state(record)?.clone();

        self.signals().send(&TransitionEvent {
            phase: Phase::Before,
            model: self.model(),
            record: &*record,
            transition: descriptor.name(),
            field,
            source: &source,
            target: descriptor.target().static_value(),
            invocation,
            error: None,
            at: Utc::now(),
        });

        match (descriptor.body())(record, invocation) {
            Ok(output) => self.complete(record, descriptor, source, invocation, output),
            Err(error) => self.fail(record, descriptor, source, invocation, error),
        }
    }

    fn complete(
        &self,
        record: &mut M,
        descriptor: &TransitionDescriptor<M>,
        source: StateValue,
        invocation: &Invocation,
        output: Value,
    ) -> Result<Value, TransitionError> {
        let field = self.field().id();
        let domain = self.field().domain();
        let target = descriptor
            .target()
            .resolve(&*record, &output, invocation)
            .map_err(|rejected| TransitionError::InvalidResultState {
                transition: descriptor.name().to_string(),
                returned: rejected.value,
                allowed: if rejected.allowed.is_empty() {
                    domain.admissible()
                } else {
                    Admissible::States(rejected.allowed)
                },
            })?;

        if let Some(resolved) = target.as_ref().filter(|_| descriptor.target().is_dynamic()) {
            if !domain.admits(resolved) {
                return Err(TransitionError::InvalidResultState {
                    transition: descriptor.name().to_string(),
                    returned: resolved.to_json(),
                    allowed: domain.admissible(),
                });
            }
            tracing::debug!(
                transition = descriptor.name(),
                target = %resolved,
                "resolved dynamic target"
            );
        }

        if let Some(resolved) = &target {
            self.cell_mut(record)?.commit(resolved.clone());
        }
        tracing::info!(
            model = self.model(),
            field = %field,
            transition = descriptor.name(),
            source = %source,
            target = %target.as_ref().unwrap_or(&source),
            "transition committed"
        );

        self.signals().send(&TransitionEvent {
            phase: Phase::After,
            model: self.model(),
            record: &*record,
            transition: descriptor.name(),
            field,
            source: &source,
            target: target.as_ref(),
            invocation,
            error: None,
            at: Utc::now(),
        });

        if let Some(callback) = descriptor.on_success() {
            let done = Completed {
                transition: descriptor.name(),
                source: &source,
                target: target.as_ref(),
                invocation,
            };
            callback(record, &done).map_err(|source| TransitionError::Callback {
                transition: descriptor.name().to_string(),
                source,
            })?;
        }

        Ok(output)
    }

    fn fail(
        &self,
        record: &mut M,
        descriptor: &TransitionDescriptor<M>,
        source: StateValue,
        invocation: &Invocation,
        error: anyhow::Error,
    ) -> Result<Value, TransitionError> {
        let field = self.field().id();
        let Some(error_state) = descriptor.on_error() else {
            if self.options().notify_unhandled_failures {
                self.signals().send(&TransitionEvent {
                    phase: Phase::After,
                    model: self.model(),
                    record: &*record,
                    transition: descriptor.name(),
                    field,
                    source: &source,
                    target: None,
                    invocation,
                    error: Some(&error),
                    at: Utc::now(),
                });
            }
            return Err(TransitionError::Method {
                transition: descriptor.name().to_string(),
                source: error,
            });
        };

        if !self.field().domain().admits(error_state) {
            return Err(TransitionError::InvalidErrorState {
                transition: descriptor.name().to_string(),
                state: error_state.clone(),
                source: error,
            });
        }

        self.cell_mut(record)?.commit(error_state.clone());
        tracing::warn!(
            model = self.model(),
            field = %field,
            transition = descriptor.name(),
            source = %source,
            target = %error_state,
            error = %error,
            "transition failed, moved to error state"
        );

        self.signals().send(&TransitionEvent {
            phase: Phase::After,
            model: self.model(),
            record: &*record,
            transition: descriptor.name(),
            field,
            source: &source,
            target: Some(error_state),
            invocation,
            error: Some(&error),
            at: Utc::now(),
        });

        Err(TransitionError::Method {
            transition: descriptor.name().to_string(),
            source: error,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::StateCell;
    use crate::machine::StateField;
    use statefield_core::{FieldId, StateDomain};

    const STATUS: FieldId = FieldId::new("status");

    #[derive(Debug)]
    struct Job {
        status: StateCell,
        runs: u32,
    }

    impl Stateful for Job {
        fn state_fields(&self) -> Vec<FieldId> {
            vec![STATUS]
        }

        fn state_cell(&self, field: FieldId) -> Option<&StateCell> {
            (field == STATUS).then_some(&self.status)
        }

        fn state_cell_mut(&mut self, field: FieldId) -> Option<&mut StateCell> {
            (field == STATUS).then_some(&mut self.status)
        }
    }

    fn job(status: &str) -> Job {
        Job {
            status: StateCell::protected(STATUS, status),
            runs: 0,
        }
    }

    fn domain() -> StateDomain {
        StateDomain::text().choices(["queued", "running", "done", "failed"])
    }

    #[test]
    fn source_only_skips_conditions() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS))
            .transition(
                TransitionDescriptor::builder("start")
                    .source("queued")
                    .target("running")
                    .condition("never", |_: &Job| false),
            )
            .build()
            .unwrap();
        let mut record = job("queued");
        assert!(machine.call(&mut record, "start", Invocation::new()).is_err());
        machine
            .call_with(&mut record, "start", Invocation::new(), Checks::SourceOnly)
            .unwrap();
        assert_eq!(record.status.get(), "running");
    }

    #[test]
    fn error_state_outside_domain_leaves_record_untouched() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS).with_domain(domain()))
            .transition(
                TransitionDescriptor::builder("start")
                    .source("queued")
                    .target("running")
                    .on_error("crashed")
                    .body(|_: &mut Job, _| anyhow::bail!("boom")),
            )
            .build()
            .unwrap();
        let mut record = job("queued");
        let err = machine.call(&mut record, "start", Invocation::new()).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidErrorState { .. }));
        assert_eq!(err.method_error().unwrap().to_string(), "boom");
        assert_eq!(record.status.get(), "queued");
    }

    #[test]
    fn dynamic_target_outside_domain_is_rejected() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS).with_domain(domain()))
            .transition(
                TransitionDescriptor::builder("finish")
                    .source("running")
                    .return_value(Vec::<StateValue>::new())
                    .returns(|job: &mut Job, _| {
                        job.runs += 1;
                        Ok(Value::from("vanished"))
                    }),
            )
            .build()
            .unwrap();
        let mut record = job("running");
        let err = machine.call(&mut record, "finish", Invocation::new()).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidResultState { .. }));
        assert_eq!(record.status.get(), "running");
        assert_eq!(record.runs, 1);
    }

    #[test]
    fn unchanged_target_runs_body_without_moving_state() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS))
            .transition(
                TransitionDescriptor::builder("heartbeat")
                    .source("+")
                    .body(|job: &mut Job, _| {
                        job.runs += 1;
                        Ok(())
                    }),
            )
            .build()
            .unwrap();
        let mut record = job("running");
        machine.call(&mut record, "heartbeat", Invocation::new()).unwrap();
        assert_eq!(record.status.get(), "running");
        assert_eq!(record.runs, 1);
    }

    fn numbered(status: i64) -> Job {
        Job {
            status: StateCell::protected(STATUS, status),
            runs: 0,
        }
    }

    #[test]
    fn integer_states_flow_through_every_write_path() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS))
            .transition(
                TransitionDescriptor::builder("start")
                    .source(1_i64)
                    .target(2_i64)
                    .on_error(-1_i64)
                    .body(|_: &mut Job, _| anyhow::bail!("boom")),
            )
            .transition(
                TransitionDescriptor::builder("settle")
                    .source(1_i64)
                    .return_value([2_i64, 3])
                    .returns(|_: &mut Job, _| Ok(Value::from(3))),
            )
            .build()
            .unwrap();

        let mut failing = numbered(1);
        let err = machine.call(&mut failing, "start", Invocation::new()).unwrap_err();
        assert!(matches!(err, TransitionError::Method { .. }));
        assert_eq!(failing.status.get(), &StateValue::from(-1_i64));

        let mut settling = numbered(1);
        let output = machine.call(&mut settling, "settle", Invocation::new()).unwrap();
        assert_eq!(output, Value::from(3));
        assert_eq!(settling.status.get(), &StateValue::from(3_i64));
    }

    #[test]
    fn rejected_result_reports_the_field_kind() {
        let machine: Machine<Job> =
            Machine::builder(StateField::new(STATUS).with_domain(StateDomain::integer()))
                .transition(
                    TransitionDescriptor::builder("settle")
                        .source(1_i64)
                        .return_value(Vec::<StateValue>::new())
                        .returns(|_: &mut Job, _| Ok(Value::from("done"))),
                )
                .build()
                .unwrap();
        let mut record = numbered(1);
        let err = machine.call(&mut record, "settle", Invocation::new()).unwrap_err();
        match err {
            TransitionError::InvalidResultState { ref allowed, .. } => {
                assert_eq!(*allowed, Admissible::Kind(statefield_core::StateKind::Integer));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().ends_with("which is not an integer state"));
        assert_eq!(record.status.get(), &StateValue::from(1_i64));
    }

    #[test]
    fn stacked_rules_pick_the_target_for_the_current_state() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS))
            .transition(
                TransitionDescriptor::builder("retry")
                    .source("failed")
                    .target("queued")
                    .body(|job: &mut Job, _| {
                        job.runs += 1;
                        Ok(())
                    }),
            )
            .transition(
                TransitionDescriptor::builder("retry")
                    .source("*")
                    .target("running")
                    .body(|job: &mut Job, _| {
                        job.runs += 10;
                        Ok(())
                    }),
            )
            .build()
            .unwrap();

        let mut failed = job("failed");
        machine.call(&mut failed, "retry", Invocation::new()).unwrap();
        assert_eq!(failed.status.get(), "queued");
        assert_eq!(failed.runs, 1);

        let mut done = job("done");
        machine.call(&mut done, "retry", Invocation::new()).unwrap();
        assert_eq!(done.status.get(), "running");
        assert_eq!(done.runs, 10);
    }

    #[test]
    fn unknown_transition_is_reported() {
        let machine: Machine<Job> = Machine::builder(StateField::new(STATUS)).build().unwrap();
        let err = machine
            .call(&mut job("queued"), "start", Invocation::new())
            .unwrap_err();
        assert!(matches!(err, TransitionError::UnknownTransition { .. }));
    }
}
