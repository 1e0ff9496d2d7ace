//! # Principals and Permissions
//!
//! A transition may require a permission from the acting principal. The
//! permission is either a capability name, checked object-level first and
//! then globally, or a predicate over the record and the principal.
//!
//! Permission checks are never run by the executor itself. Callers ask
//! before invoking (`has_transition_perm`) or filter enumerations with
//! `available_transitions_for`.

use std::any::Any;
use std::sync::Arc;

/// An acting user or service.
pub trait Principal {
    /// Whether the principal holds `capability` globally.
    fn has_capability(&self, capability: &str) -> bool;

    /// Whether the principal holds `capability` for this specific record.
    fn has_object_capability(&self, capability: &str, record: &dyn Any) -> bool {
        let _ = (capability, record);
        false
    }
}

/// Predicate form of a permission.
pub type PermissionFn<M> = Arc<dyn Fn(&M, &dyn Principal) -> bool + Send + Sync>;

/// Access requirement of a transition.
pub enum Permission<M> {
    /// A named capability.
    Capability(String),
    /// An arbitrary predicate.
    Predicate(PermissionFn<M>),
}

impl<M: Any> Permission<M> {
    /// Whether `principal` may run the transition on `record`.
    pub fn allows(&self, record: &M, principal: &dyn Principal) -> bool {
        match self {
            Self::Capability(capability) => {
                principal.has_object_capability(capability, record)
                    || principal.has_capability(capability)
            }
            Self::Predicate(check) => check(record, principal),
        }
    }

    pub(crate) fn lift<D: Any>(&self, view: fn(&D) -> &M) -> Permission<D> {
        match self {
            Self::Capability(capability) => Permission::Capability(capability.clone()),
            Self::Predicate(check) => {
                let check = Arc::clone(check);
                Permission::Predicate(Arc::new(move |record: &D, principal: &dyn Principal| {
                    check(view(record), principal)
                }))
            }
        }
    }
}

impl<M> Clone for Permission<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Capability(capability) => Self::Capability(capability.clone()),
            Self::Predicate(check) => Self::Predicate(Arc::clone(check)),
        }
    }
}

impl<M> std::fmt::Debug for Permission<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capability(capability) => f.debug_tuple("Capability").field(capability).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A principal described by a flat list of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    granted: Vec<String>,
}

impl Capabilities {
    /// A principal with the given capabilities.
    pub fn new<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }

    /// A principal holding nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

impl Principal for Capabilities {
    fn has_capability(&self, capability: &str) -> bool {
        self.granted.iter().any(|c| c == capability)
    }
}
