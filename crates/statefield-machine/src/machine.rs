//! # Machines
//!
//! A `Machine` binds one state field of one record type to its transition
//! registry, its runtime options and its notification hooks. Machines are
//! built once, typically into a `static LazyLock`, and shared by every record
//! of the type.
//!
//! ## Query Surface
//!
//! ```text
//! call / call_with            run a transition (executor)
//! can_proceed                 source (+ conditions) without running
//! has_transition_perm         source + conditions + permission
//! transition_for              the rule handling the current state
//! all_transitions             every declared rule
//! available_transitions       source matches and conditions hold
//! available_transitions_for   ... and the principal is permitted
//! ```
//!
//! Queries never fire hooks and never touch the record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use statefield_core::{
    DeclarationError, FieldId, NotAllowedKind, StateDomain, StateValue, TransitionError,
};

use crate::cell::{StateCell, Stateful};
use crate::descriptor::{Condition, TransitionBuilder, TransitionDescriptor};
use crate::principal::Principal;
use crate::registry::TransitionRegistry;
use crate::signal::Signals;

/// Declaration of one state field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateField {
    id: FieldId,
    #[serde(default)]
    domain: StateDomain,
    #[serde(default)]
    protected: bool,
}

impl StateField {
    /// An unprotected field accepting any text or integer state.
    pub fn new(id: FieldId) -> Self {
        Self {
            id,
            domain: StateDomain::default(),
            protected: false,
        }
    }

    /// Restrict the field to `domain`.
    pub fn with_domain(mut self, domain: StateDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Refuse direct assignment.
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// The canonical identifier.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// The value domain.
    pub fn domain(&self) -> &StateDomain {
        &self.domain
    }

    /// Whether direct assignment is refused.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// A fresh cell for this field.
    pub fn new_cell(&self, initial: impl Into<StateValue>) -> StateCell {
        if self.protected {
            StateCell::protected(self.id, initial)
        } else {
            StateCell::new(self.id, initial)
        }
    }
}

/// What to do when a condition predicate raises instead of answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionErrorPolicy {
    /// Surface the error as `TransitionError::Condition`.
    #[default]
    Propagate,
    /// Treat the condition as not met.
    TreatAsUnmet,
}

/// Runtime options of a machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Raising-condition policy.
    pub condition_errors: ConditionErrorPolicy,
    /// Fire the `after` hook when a method raises and no error state is
    /// configured.
    pub notify_unhandled_failures: bool,
}

/// The state machine of one field of record type `M`.
pub struct Machine<M> {
    model: String,
    field: StateField,
    registry: TransitionRegistry<M>,
    options: MachineOptions,
    signals: Signals<M>,
}

impl<M: Stateful> Machine<M> {
    /// Start building a machine for `field`.
    pub fn builder(field: StateField) -> MachineBuilder<M> {
        MachineBuilder::new(field)
    }

    /// Record type name, as reported in hooks and errors.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The field declaration.
    pub fn field(&self) -> &StateField {
        &self.field
    }

    /// The runtime options.
    pub fn options(&self) -> MachineOptions {
        self.options
    }

    /// The notification hooks.
    pub fn signals(&self) -> &Signals<M> {
        &self.signals
    }

    /// The transition registry.
    pub fn registry(&self) -> &TransitionRegistry<M> {
        &self.registry
    }

    /// A fresh cell for this machine's field.
    pub fn new_cell(&self, initial: impl Into<StateValue>) -> StateCell {
        self.field.new_cell(initial)
    }

    /// The record's current state.
    pub fn state<'r>(&self, record: &'r M) -> Result<&'r StateValue, TransitionError> {
        record
            .state_cell(self.field.id)
            .map(StateCell::get)
            .ok_or(TransitionError::UnknownField { field: self.field.id })
    }

    pub(crate) fn cell_mut<'r>(&self, record: &'r mut M) -> Result<&'r mut StateCell, TransitionError> {
        record
            .state_cell_mut(self.field.id)
            .ok_or(TransitionError::UnknownField { field: self.field.id })
    }

    /// Every rule declared under `name`.
    pub fn rules(&self, name: &str) -> Result<&[Arc<TransitionDescriptor<M>>], TransitionError> {
        self.registry
            .rules(name)
            .ok_or_else(|| TransitionError::UnknownTransition {
                field: self.field.id,
                name: name.to_string(),
            })
    }

    /// The rule of transition `name` that handles the record's current
    /// state. Conditions are not evaluated.
    ///
    /// # Errors
    ///
    /// `UnknownTransition`, or `NotAllowed` when no rule accepts the
    /// current state.
    pub fn transition_for(&self, record: &M, name: &str) -> Result<&TransitionDescriptor<M>, TransitionError> {
        match self.admit(record, name, false)? {
            Ok(descriptor) => Ok(descriptor),
            Err(kind) => Err(self.not_allowed(name, self.state(record)?.clone(), kind)),
        }
    }

    /// The first condition of `descriptor` that does not hold, applying the
    /// machine's raising-condition policy.
    pub(crate) fn first_unmet<'d>(
        &self,
        record: &M,
        descriptor: &'d TransitionDescriptor<M>,
    ) -> Result<Option<&'d Condition<M>>, TransitionError> {
        for condition in descriptor.conditions() {
            let holds = match condition.evaluate(record) {
                Ok(holds) => holds,
                Err(source) => match self.options.condition_errors {
                    ConditionErrorPolicy::Propagate => {
                        return Err(TransitionError::Condition {
                            transition: descriptor.name().to_string(),
                            condition: condition.name().to_string(),
                            source,
                        })
                    }
                    ConditionErrorPolicy::TreatAsUnmet => false,
                },
            };
            if !holds {
                return Ok(Some(condition));
            }
        }
        Ok(None)
    }

    /// The rule of `name` allowed to run right now, or the reason none is.
    pub(crate) fn admit(
        &self,
        record: &M,
        name: &str,
        check_conditions: bool,
    ) -> Result<Result<&TransitionDescriptor<M>, NotAllowedKind>, TransitionError> {
        self.rules(name)?;
        let current = self.state(record)?;
        let Some(descriptor) = self.registry.select(name, current) else {
            return Ok(Err(NotAllowedKind::InvalidSource));
        };
        if check_conditions {
            if let Some(condition) = self.first_unmet(record, descriptor)? {
                return Ok(Err(NotAllowedKind::ConditionNotMet {
                    condition: condition.name().to_string(),
                }));
            }
        }
        Ok(Ok(descriptor))
    }

    pub(crate) fn not_allowed(&self, name: &str, state: StateValue, kind: NotAllowedKind) -> TransitionError {
        TransitionError::NotAllowed {
            transition: name.to_string(),
            field: self.field.id,
            state,
            kind,
        }
    }

    /// Whether transition `name` would be allowed right now. Nothing runs
    /// and no hook fires.
    pub fn can_proceed(
        &self,
        record: &M,
        name: &str,
        check_conditions: bool,
    ) -> Result<bool, TransitionError> {
        Ok(self.admit(record, name, check_conditions)?.is_ok())
    }

    /// Whether `principal` may run transition `name` right now: the source
    /// matches, every condition holds and the permission is satisfied.
    pub fn has_transition_perm(
        &self,
        record: &M,
        name: &str,
        principal: &dyn Principal,
    ) -> Result<bool, TransitionError> {
        Ok(match self.admit(record, name, true)? {
            Ok(descriptor) => descriptor.has_perm(record, principal),
            Err(_) => false,
        })
    }

    /// Every declared rule, regardless of state.
    pub fn all_transitions(&self) -> impl Iterator<Item = &TransitionDescriptor<M>> + '_ {
        self.registry.iter()
    }

    /// For every transition name, the rule that handles the current state,
    /// provided its conditions all hold.
    pub fn available_transitions(
        &self,
        record: &M,
    ) -> Result<Vec<&TransitionDescriptor<M>>, TransitionError> {
        let mut available = Vec::new();
        for name in self.registry.names() {
            if let Ok(descriptor) = self.admit(record, name, true)? {
                available.push(descriptor);
            }
        }
        Ok(available)
    }

    /// Available transitions that `principal` is also permitted to run.
    pub fn available_transitions_for(
        &self,
        record: &M,
        principal: &dyn Principal,
    ) -> Result<Vec<&TransitionDescriptor<M>>, TransitionError> {
        Ok(self
            .available_transitions(record)?
            .into_iter()
            .filter(|descriptor| descriptor.has_perm(record, principal))
            .collect())
    }
}

impl<M> std::fmt::Debug for Machine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("model", &self.model)
            .field("field", &self.field)
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("signals", &self.signals)
            .finish()
    }
}

/// Builder for [`Machine`].
pub struct MachineBuilder<M> {
    model: String,
    field: StateField,
    registry: TransitionRegistry<M>,
    options: MachineOptions,
    error: Option<DeclarationError>,
}

impl<M: Stateful> MachineBuilder<M> {
    fn new(field: StateField) -> Self {
        Self {
            model: short_type_name::<M>().to_string(),
            registry: TransitionRegistry::new(field.id),
            field,
            options: MachineOptions::default(),
            error: None,
        }
    }

    /// Override the record type name reported in hooks and errors.
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model = name.into();
        self
    }

    /// Set the runtime options.
    pub fn options(mut self, options: MachineOptions) -> Self {
        self.options = options;
        self
    }

    /// Declare a transition rule. Declaring the same name again from
    /// another source adds a rule to it.
    pub fn transition(self, transition: TransitionBuilder<M>) -> Self {
        self.register(transition.build())
    }

    /// Register an already built descriptor.
    pub fn register(mut self, descriptor: TransitionDescriptor<M>) -> Self {
        if let Err(error) = self.registry.register(descriptor) {
            self.error.get_or_insert(error);
        }
        self
    }

    /// Redeclare a transition, dropping every rule declared for its name so
    /// far.
    pub fn replace(mut self, transition: TransitionBuilder<M>) -> Self {
        self.registry.replace(transition.build());
        self
    }

    /// Start from the transitions of a machine on the same record type.
    pub fn inherit(mut self, base: &Machine<M>) -> Self {
        self.registry.inherit(&base.registry);
        self
    }

    /// Start from the transitions of a machine on an embedded record type.
    pub fn inherit_via<B: Stateful>(
        mut self,
        base: &Machine<B>,
        view: fn(&M) -> &B,
        view_mut: fn(&mut M) -> &mut B,
    ) -> Self {
        self.registry.inherit_via(&base.registry, view, view_mut);
        self
    }

    /// Finish the machine.
    ///
    /// # Errors
    ///
    /// - `DuplicateSource` when two rules of one transition claim the same
    ///   source.
    /// - `OutsideDomain` when a fixed target or an allow-list entry is not a
    ///   value of the field.
    pub fn build(self) -> Result<Machine<M>, DeclarationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let domain = self.field.domain();
        for descriptor in self.registry.iter() {
            let declared = descriptor.target().possible_states().unwrap_or_default();
            if let Some(state) = declared.into_iter().find(|state| !domain.admits(state)) {
                return Err(DeclarationError::OutsideDomain {
                    transition: descriptor.name().to_string(),
                    state,
                    allowed: domain.admissible(),
                });
            }
        }
        Ok(Machine {
            model: self.model,
            field: self.field,
            registry: self.registry,
            options: self.options,
            signals: Signals::new(),
        })
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Capabilities;

    const STATE: FieldId = FieldId::new("state");

    #[derive(Debug)]
    struct Post {
        state: StateCell,
        title: String,
    }

    impl Stateful for Post {
        fn state_fields(&self) -> Vec<FieldId> {
            vec![STATE]
        }

        fn state_cell(&self, field: FieldId) -> Option<&StateCell> {
            (field == STATE).then_some(&self.state)
        }

        fn state_cell_mut(&mut self, field: FieldId) -> Option<&mut StateCell> {
            (field == STATE).then_some(&mut self.state)
        }
    }

    fn machine() -> Machine<Post> {
        Machine::builder(StateField::new(STATE))
            .transition(
                TransitionDescriptor::builder("publish")
                    .source("new")
                    .target("published")
                    .condition("has_title", |p: &Post| !p.title.is_empty())
                    .permission("blog.publish"),
            )
            .transition(TransitionDescriptor::builder("hide").source("published").target("hidden"))
            .transition(TransitionDescriptor::builder("cancel").source("*").target("cancelled"))
            .build()
            .unwrap()
    }

    fn post(state: &str, title: &str) -> Post {
        Post {
            state: StateCell::new(STATE, state),
            title: title.into(),
        }
    }

    #[test]
    fn model_name_defaults_to_type_name() {
        assert_eq!(machine().model(), "Post");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn can_proceed_checks_source_then_conditions() {
        let m = machine();
        let untitled = post("new", "");
        assert!(m.can_proceed(&untitled, "publish", false).unwrap());
        assert!(!m.can_proceed(&untitled, "publish", true).unwrap());
        assert!(!m.can_proceed(&untitled, "hide", false).unwrap());
        assert!(m.can_proceed(&untitled, "missing", true).is_err());
    }

    #[test]
    fn has_transition_perm_requires_everything() {
        let m = machine();
        let editor = Capabilities::new(["blog.publish"]);
        assert!(m.has_transition_perm(&post("new", "Hi"), "publish", &editor).unwrap());
        assert!(!m.has_transition_perm(&post("new", ""), "publish", &editor).unwrap());
        assert!(!m
            .has_transition_perm(&post("new", "Hi"), "publish", &Capabilities::none())
            .unwrap());
        assert!(!m.has_transition_perm(&post("hidden", "Hi"), "publish", &editor).unwrap());
    }

    #[test]
    fn enumeration_queries() {
        let m = machine();
        let record = post("new", "Hi");
        let all: Vec<_> = m.all_transitions().map(|d| d.name()).collect();
        assert_eq!(all, ["publish", "hide", "cancel"]);
        let available: Vec<_> = m
            .available_transitions(&record)
            .unwrap()
            .into_iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(available, ["publish", "cancel"]);
        let permitted: Vec<_> = m
            .available_transitions_for(&record, &Capabilities::none())
            .unwrap()
            .into_iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(permitted, ["cancel"]);
    }

    #[test]
    fn raising_condition_follows_policy() {
        let build = |options| {
            Machine::builder(StateField::new(STATE))
                .options(options)
                .transition(
                    TransitionDescriptor::builder("check")
                        .fallible_condition("remote", |_: &Post| anyhow::bail!("unreachable")),
                )
                .build()
                .unwrap()
        };
        let record = post("new", "");

        let propagate: Machine<Post> = build(MachineOptions::default());
        let err = propagate.can_proceed(&record, "check", true).unwrap_err();
        assert!(matches!(err, TransitionError::Condition { ref condition, .. } if condition == "remote"));

        let lenient: Machine<Post> = build(MachineOptions {
            condition_errors: ConditionErrorPolicy::TreatAsUnmet,
            ..MachineOptions::default()
        });
        assert!(!lenient.can_proceed(&record, "check", true).unwrap());
        assert!(lenient.available_transitions(&record).unwrap().is_empty());
    }

    #[test]
    fn one_name_runs_the_rule_for_the_current_state() {
        let m: Machine<Post> = Machine::builder(StateField::new(STATE))
            .transition(TransitionDescriptor::builder("review").source("submitted").target("in_review"))
            .transition(
                TransitionDescriptor::builder("review")
                    .source("flagged")
                    .target("escalated")
                    .condition("has_title", |p: &Post| !p.title.is_empty()),
            )
            .build()
            .unwrap();

        let rule = m.transition_for(&post("flagged", ""), "review").unwrap();
        assert_eq!(rule.target().to_string(), "escalated");
        assert!(m.can_proceed(&post("submitted", ""), "review", true).unwrap());
        assert!(!m.can_proceed(&post("flagged", ""), "review", true).unwrap());
        assert!(m.can_proceed(&post("flagged", ""), "review", false).unwrap());

        let err = m.transition_for(&post("published", ""), "review").unwrap_err();
        assert!(matches!(
            err,
            TransitionError::NotAllowed { kind: NotAllowedKind::InvalidSource, .. }
        ));
        assert_eq!(m.all_transitions().count(), 2);
        let available: Vec<_> = m
            .available_transitions(&post("flagged", "Hi"))
            .unwrap()
            .into_iter()
            .map(|d| d.target().to_string())
            .collect();
        assert_eq!(available, ["escalated"]);
    }

    #[test]
    fn build_rejects_a_repeated_source() {
        let err = Machine::<Post>::builder(StateField::new(STATE))
            .transition(TransitionDescriptor::builder("publish").source("new").target("published"))
            .transition(TransitionDescriptor::builder("publish").source("new").target("hidden"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateSource { ref transition, .. } if transition == "publish"));
    }

    #[test]
    fn replace_redeclares_without_conflict() {
        let m: Machine<Post> = Machine::builder(StateField::new(STATE))
            .transition(TransitionDescriptor::builder("publish").source("new").target("published"))
            .replace(TransitionDescriptor::builder("publish").source("new").target("hidden"))
            .build()
            .unwrap();
        let rule = m.transition_for(&post("new", ""), "publish").unwrap();
        assert_eq!(rule.target().to_string(), "hidden");
    }

    #[test]
    fn build_checks_declared_states_against_the_domain() {
        let typed = || StateField::new(STATE).with_domain(StateDomain::integer());
        let err = Machine::<Post>::builder(typed())
            .transition(TransitionDescriptor::builder("publish").source(1_i64).target("published"))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "transition 'publish' declares state 'published', which is not an integer state");

        let err = Machine::<Post>::builder(typed())
            .transition(
                TransitionDescriptor::builder("grade")
                    .source(1_i64)
                    .return_value([StateValue::from(2), StateValue::from("top")]),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::OutsideDomain { ref state, .. } if *state == StateValue::from("top")));

        assert!(Machine::<Post>::builder(typed())
            .transition(TransitionDescriptor::builder("grade").source(1_i64).return_value([2_i64, 3]))
            .build()
            .is_ok());
    }

    #[test]
    fn protected_field_creates_protected_cells() {
        let field = StateField::new(STATE).protected();
        assert!(field.new_cell("new").is_protected());
        assert!(!StateField::new(STATE).new_cell("new").is_protected());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: MachineOptions =
            serde_json::from_str(r#"{"condition_errors":"treat_as_unmet"}"#).unwrap();
        assert_eq!(options.condition_errors, ConditionErrorPolicy::TreatAsUnmet);
        assert!(!options.notify_unhandled_failures);
    }
}
