//! # Transition Notifications
//!
//! Two hooks per machine. `before` fires once a call has passed its source
//! and condition checks, immediately before the method runs. `after` fires
//! once the state has been committed, or once a failure has been redirected
//! to the error state.
//!
//! Listeners are plain closures. They observe the record but cannot change
//! it; work that must mutate the record after a transition belongs in the
//! descriptor's success callback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use statefield_core::{FieldId, StateValue};

use crate::invocation::Invocation;

/// Which hook an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the method runs.
    Before,
    /// After the state was committed or redirected.
    After,
}

/// Payload delivered to a hook.
#[derive(Debug)]
pub struct TransitionEvent<'a, M> {
    /// Which hook is being notified.
    pub phase: Phase,
    /// Record type name.
    pub model: &'a str,
    /// The record.
    pub record: &'a M,
    /// Transition name.
    pub transition: &'a str,
    /// State field.
    pub field: FieldId,
    /// State before the transition.
    pub source: &'a StateValue,
    /// On `Before`, the target when statically known. On `After`, the state
    /// committed: the resolved target or the error state. `None` when the
    /// state did not change.
    pub target: Option<&'a StateValue>,
    /// The arguments the method received.
    pub invocation: &'a Invocation,
    /// On `After`, the method's error when the call failed.
    pub error: Option<&'a anyhow::Error>,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
}

impl<M> TransitionEvent<'_, M> {
    /// Whether this event reports a failed call.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

type Listener<M> = Arc<dyn Fn(&TransitionEvent<'_, M>) + Send + Sync>;

/// The hook registry of one machine.
pub struct Signals<M> {
    before: RwLock<Vec<Listener<M>>>,
    after: RwLock<Vec<Listener<M>>>,
}

impl<M> Signals<M> {
    /// No listeners.
    pub fn new() -> Self {
        Self {
            before: RwLock::new(Vec::new()),
            after: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to the `before` hook.
    pub fn connect_before<F>(&self, listener: F)
    where
        F: Fn(&TransitionEvent<'_, M>) + Send + Sync + 'static,
    {
        self.before.write().push(Arc::new(listener));
    }

    /// Subscribe to the `after` hook.
    pub fn connect_after<F>(&self, listener: F)
    where
        F: Fn(&TransitionEvent<'_, M>) + Send + Sync + 'static,
    {
        self.after.write().push(Arc::new(listener));
    }

    /// Deliver `event` to every listener of its phase, in subscription
    /// order.
    pub fn send(&self, event: &TransitionEvent<'_, M>) {
        // Listeners may subscribe further listeners; release the lock first.
        let listeners: Vec<Listener<M>> = match event.phase {
            Phase::Before => self.before.read().clone(),
            Phase::After => self.after.read().clone(),
        };
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of listeners on `phase`.
    pub fn listener_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Before => self.before.read().len(),
            Phase::After => self.after.read().len(),
        }
    }
}

impl<M> Default for Signals<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for Signals<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals")
            .field("before", &self.listener_count(Phase::Before))
            .field("after", &self.listener_count(Phase::After))
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
