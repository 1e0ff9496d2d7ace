//! # Transition Registry
//!
//! One registry per (record type, state field). It holds the field's
//! transitions in declaration order and is only mutated while the owning
//! [`Machine`](crate::Machine) is being built.
//!
//! ## Rules
//!
//! A transition name may carry several rules, one per source, each with its
//! own target, conditions, permission and error state. A call runs the one
//! rule whose source handles the current state:
//!
//! ```text
//! exact state  >  longest prefix  >  "*"  >  "+"
//! ```
//!
//! Two rules of one name claiming the same source is a declaration error.
//!
//! ## Inheritance
//!
//! A derived machine starts from its ancestor's transitions and adds its
//! own. Declaring an inherited name replaces every inherited rule of that
//! name in place, so an override keeps the ancestor's position in
//! enumeration order.
//!
//! - `inherit` copies transitions from a registry of the same record type.
//! - `inherit_via` lifts transitions from a registry of an embedded record
//!   type through a pair of projections.
//! - `replace` redeclares a name outright, dropping every earlier rule.

use std::sync::Arc;

use statefield_core::{DeclarationError, FieldId, StateValue};

use crate::descriptor::TransitionDescriptor;

struct Entry<M> {
    name: String,
    inherited: bool,
    rules: Vec<Arc<TransitionDescriptor<M>>>,
}

impl<M> Clone for Entry<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inherited: self.inherited,
            rules: self.rules.clone(),
        }
    }
}

/// The transitions declared on one state field.
pub struct TransitionRegistry<M> {
    field: FieldId,
    entries: Vec<Entry<M>>,
}

impl<M: 'static> TransitionRegistry<M> {
    /// An empty registry for `field`.
    pub fn new(field: FieldId) -> Self {
        Self {
            field,
            entries: Vec::new(),
        }
    }

    /// The field this registry belongs to.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// Add a rule. A rule for a new source joins the rules already declared
    /// under its name; a rule for an inherited name replaces the inherited
    /// rules.
    ///
    /// # Errors
    ///
    /// `DuplicateSource` if a rule of the same name already claims the source.
    pub fn register(&mut self, descriptor: TransitionDescriptor<M>) -> Result<(), DeclarationError> {
        let descriptor = Arc::new(descriptor.bind(self.field));
        let Some(entry) = self.entry_mut(descriptor.name()) else {
            self.entries.push(own(descriptor));
            return Ok(());
        };
        if entry.inherited {
            *entry = own(descriptor);
            return Ok(());
        }
        if entry
            .rules
            .iter()
            .any(|rule| rule.source().overlaps(descriptor.source()))
        {
            return Err(DeclarationError::DuplicateSource {
                transition: descriptor.name().to_string(),
                state: descriptor.source().to_string(),
            });
        }
        entry.rules.push(descriptor);
        Ok(())
    }

    /// Redeclare a name: drop every earlier rule of that name and keep its
    /// position.
    pub fn replace(&mut self, descriptor: TransitionDescriptor<M>) {
        let descriptor = Arc::new(descriptor.bind(self.field));
        match self.entry_mut(descriptor.name()) {
            Some(entry) => *entry = own(descriptor),
            None => self.entries.push(own(descriptor)),
        }
    }

    /// Accumulate every transition of `base` not already declared here.
    pub fn inherit(&mut self, base: &TransitionRegistry<M>) {
        for entry in &base.entries {
            if self.rules(&entry.name).is_none() {
                self.entries.push(Entry {
                    inherited: true,
                    ..entry.clone()
                });
            }
        }
    }

    /// Accumulate every transition of a registry declared on an embedded
    /// record type, seen through `view` and `view_mut`.
    pub fn inherit_via<B: 'static>(
        &mut self,
        base: &TransitionRegistry<B>,
        view: fn(&M) -> &B,
        view_mut: fn(&mut M) -> &mut B,
    ) {
        for entry in &base.entries {
            if self.rules(&entry.name).is_none() {
                let rules = entry
                    .rules
                    .iter()
                    .map(|rule| Arc::new(rule.lift(view, view_mut).bind(self.field)))
                    .collect();
                self.entries.push(Entry {
                    name: entry.name.clone(),
                    inherited: true,
                    rules,
                });
            }
        }
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry<M>> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    /// Every rule declared under `name`, in declaration order.
    pub fn rules(&self, name: &str) -> Option<&[Arc<TransitionDescriptor<M>>]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.rules.as_slice())
    }

    /// The rule of `name` that handles `current`. Conditions are not
    /// evaluated.
    pub fn select(&self, name: &str, current: &StateValue) -> Option<&TransitionDescriptor<M>> {
        self.rules(name).and_then(|rules| select(rules, current))
    }

    /// Every rule, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &TransitionDescriptor<M>> + '_ {
        self.entries
            .iter()
            .flat_map(|entry| entry.rules.iter().map(AsRef::as_ref))
    }

    /// Every transition name, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// For every name, the rule whose source handles `current`. Conditions
    /// are not evaluated.
    pub fn matching<'a>(
        &'a self,
        current: &'a StateValue,
    ) -> impl Iterator<Item = &'a TransitionDescriptor<M>> + 'a {
        self.entries
            .iter()
            .filter_map(move |entry| select(&entry.rules, current))
    }

    /// Number of transition names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no transition is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn own<M: 'static>(descriptor: Arc<TransitionDescriptor<M>>) -> Entry<M> {
    Entry {
        name: descriptor.name().to_string(),
        inherited: false,
        rules: vec![descriptor],
    }
}

fn select<'a, M: 'static>(
    rules: &'a [Arc<TransitionDescriptor<M>>],
    current: &StateValue,
) -> Option<&'a TransitionDescriptor<M>> {
    rules
        .iter()
        .filter(|rule| rule.accepts(current))
        .max_by_key(|rule| rule.source().precedence())
        .map(AsRef::as_ref)
}

impl<M> std::fmt::Debug for TransitionRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.entries {
            map.entry(&entry.name, &entry.rules);
        }
        map.finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
