//! # Transition Descriptors
//!
//! A `TransitionDescriptor` is the immutable declaration of one transition:
//! its name, source, target, conditions, permission, error state, success
//! callback, custom metadata and the method body it wraps. Descriptors are
//! built once when a machine is declared and shared (behind `Arc`) by every
//! record of the declaring type.
//!
//! ```text
//! TransitionDescriptor::builder("publish")
//!     .source("new")
//!     .target("published")
//!     .on_error("failed")
//!     .condition("has_title", |post: &Post| !post.title.is_empty())
//!     .body(|post: &mut Post, _| { post.publish_count += 1; Ok(()) })
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use statefield_core::{FieldId, StateValue};

use crate::invocation::Invocation;
use crate::principal::{Permission, Principal};
use crate::source::SourceSpec;
use crate::target::TargetSpec;

/// The wrapped method: receives the record and the invocation, returns the
/// method's output.
pub type Body<M> = Arc<dyn Fn(&mut M, &Invocation) -> anyhow::Result<Value> + Send + Sync>;

/// Callback invoked after a successful, committed transition.
pub type SuccessCallback<M> = Arc<dyn Fn(&mut M, &Completed<'_>) -> anyhow::Result<()> + Send + Sync>;

type Check<M> = Arc<dyn Fn(&M) -> anyhow::Result<bool> + Send + Sync>;

/// What the success callback learns about the finished transition.
#[derive(Debug, Clone, Copy)]
pub struct Completed<'a> {
    /// Transition name.
    pub transition: &'a str,
    /// State before the transition.
    pub source: &'a StateValue,
    /// State after the transition; `None` when the target left it unchanged.
    pub target: Option<&'a StateValue>,
    /// The arguments the method received.
    pub invocation: &'a Invocation,
}

/// A named, side-effect-free precondition.
pub struct Condition<M> {
    name: String,
    check: Check<M>,
}

impl<M> Condition<M> {
    /// A predicate that always answers.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |record: &M| Ok(check(record))),
        }
    }

    /// A predicate that may fail to answer.
    pub fn fallible<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&M) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Condition name, used in rejection errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a record.
    pub fn evaluate(&self, record: &M) -> anyhow::Result<bool> {
        (self.check)(record)
    }

    fn lift<D: 'static>(&self, view: fn(&D) -> &M) -> Condition<D>
    where
        M: 'static,
    {
        let check = Arc::clone(&self.check);
        Condition {
            name: self.name.clone(),
            check: Arc::new(move |record: &D| check(view(record))),
        }
    }
}

impl<M> Clone for Condition<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

impl<M> std::fmt::Debug for Condition<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Condition").field(&self.name).finish()
    }
}

/// Immutable declaration of one transition.
pub struct TransitionDescriptor<M> {
    name: String,
    field: FieldId,
    source: SourceSpec,
    target: TargetSpec<M>,
    conditions: Vec<Condition<M>>,
    permission: Option<Permission<M>>,
    on_error: Option<StateValue>,
    on_success: Option<SuccessCallback<M>>,
    custom: BTreeMap<String, Value>,
    body: Body<M>,
}

impl<M: 'static> TransitionDescriptor<M> {
    /// Start declaring a transition.
    pub fn builder(name: impl Into<String>) -> TransitionBuilder<M> {
        TransitionBuilder::new(name)
    }

    /// Transition name; unique within a registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The state field this transition moves.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// Source specification.
    pub fn source(&self) -> &SourceSpec {
        &self.source
    }

    /// Target specification.
    pub fn target(&self) -> &TargetSpec<M> {
        &self.target
    }

    /// Conditions, in declaration order.
    pub fn conditions(&self) -> &[Condition<M>] {
        &self.conditions
    }

    /// Required permission, if any.
    pub fn permission(&self) -> Option<&Permission<M>> {
        self.permission.as_ref()
    }

    /// State applied when the method raises.
    pub fn on_error(&self) -> Option<&StateValue> {
        self.on_error.as_ref()
    }

    /// Custom metadata.
    pub fn custom(&self) -> &BTreeMap<String, Value> {
        &self.custom
    }

    /// One custom metadata entry.
    pub fn custom_value(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    pub(crate) fn body(&self) -> &Body<M> {
        &self.body
    }

    pub(crate) fn on_success(&self) -> Option<&SuccessCallback<M>> {
        self.on_success.as_ref()
    }

    /// Whether the current state is accepted by the source.
    pub fn accepts(&self, current: &StateValue) -> bool {
        self.source.matches(current, self.target.static_value())
    }

    /// Whether `principal` satisfies the permission. Transitions without a
    /// permission are open to everyone.
    pub fn has_perm(&self, record: &M, principal: &dyn Principal) -> bool
    where
        M: Any,
    {
        self.permission
            .as_ref()
            .map_or(true, |permission| permission.allows(record, principal))
    }

    pub(crate) fn bind(mut self, field: FieldId) -> Self {
        self.field = field;
        self
    }

    /// Re-home this descriptor onto a record type `D` that embeds `M`.
    ///
    /// Conditions, permissions and resolvers see the embedded record through
    /// `view`; the body and success callback through `view_mut`.
    pub fn lift<D: 'static>(
        &self,
        view: fn(&D) -> &M,
        view_mut: fn(&mut D) -> &mut M,
    ) -> TransitionDescriptor<D> {
        let body = Arc::clone(&self.body);
        let on_success = self.on_success.as_ref().map(|callback| {
            let callback = Arc::clone(callback);
            let lifted: SuccessCallback<D> =
                Arc::new(move |record: &mut D, done: &Completed<'_>| callback(view_mut(record), done));
            lifted
        });
        TransitionDescriptor {
            name: self.name.clone(),
            field: self.field,
            source: self.source.clone(),
            target: self.target.lift(view),
            conditions: self.conditions.iter().map(|c| c.lift(view)).collect(),
            permission: self.permission.as_ref().map(|p| p.lift(view)),
            on_error: self.on_error.clone(),
            on_success,
            custom: self.custom.clone(),
            body: Arc::new(move |record: &mut D, invocation: &Invocation| {
                body(view_mut(record), invocation)
            }),
        }
    }
}

impl<M> PartialEq for TransitionDescriptor<M> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.field == other.field
    }
}

impl<M> std::fmt::Debug for TransitionDescriptor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionDescriptor")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("conditions", &self.conditions)
            .field("permission", &self.permission)
            .field("on_error", &self.on_error)
            .field("custom", &self.custom)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TransitionDescriptor`].
///
/// Defaults: source `*`, target unchanged, no conditions, no permission, no
/// error state, and a body that does nothing and returns `null`.
pub struct TransitionBuilder<M> {
    descriptor: TransitionDescriptor<M>,
}

impl<M: 'static> TransitionBuilder<M> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: TransitionDescriptor {
                name: name.into(),
                field: FieldId::new(""),
                source: SourceSpec::Any,
                target: TargetSpec::Unchanged,
                conditions: Vec::new(),
                permission: None,
                on_error: None,
                on_success: None,
                custom: BTreeMap::new(),
                body: Arc::new(|_: &mut M, _: &Invocation| Ok(Value::Null)),
            },
        }
    }

    /// Source states.
    pub fn source(mut self, source: impl Into<SourceSpec>) -> Self {
        self.descriptor.source = source.into();
        self
    }

    /// Target specification.
    pub fn target(mut self, target: impl Into<TargetSpec<M>>) -> Self {
        self.descriptor.target = target.into();
        self
    }

    /// Use the method's return value as the target, restricted to `allowed`.
    pub fn return_value<I, V>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
    {
        self.target(TargetSpec::return_value(allowed))
    }

    /// Compute the target with `resolve`, restricted to `allowed`.
    pub fn computed<I, V, F>(self, allowed: I, resolve: F) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StateValue>,
        F: Fn(&M, &Invocation) -> StateValue + Send + Sync + 'static,
    {
        self.target(TargetSpec::computed(allowed, resolve))
    }

    /// Add a condition.
    pub fn condition<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.descriptor.conditions.push(Condition::new(name, check));
        self
    }

    /// Add a condition that may fail to answer.
    pub fn fallible_condition<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&M) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.descriptor.conditions.push(Condition::fallible(name, check));
        self
    }

    /// Require a capability.
    pub fn permission(mut self, capability: impl Into<String>) -> Self {
        self.descriptor.permission = Some(Permission::Capability(capability.into()));
        self
    }

    /// Require a predicate over record and principal.
    pub fn permission_fn<F>(mut self, check: F) -> Self
    where
        F: Fn(&M, &dyn Principal) -> bool + Send + Sync + 'static,
    {
        self.descriptor.permission = Some(Permission::Predicate(Arc::new(check)));
        self
    }

    /// State applied when the method raises.
    pub fn on_error(mut self, state: impl Into<StateValue>) -> Self {
        self.descriptor.on_error = Some(state.into());
        self
    }

    /// Callback run after a successful commit.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut M, &Completed<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.descriptor.on_success = Some(Arc::new(callback));
        self
    }

    /// Attach custom metadata.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.descriptor.custom.insert(key.into(), value.into());
        self
    }

    /// Method body with no meaningful return value.
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut M, &Invocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.descriptor.body = Arc::new(move |record: &mut M, invocation: &Invocation| {
            body(record, invocation).map(|()| Value::Null)
        });
        self
    }

    /// Method body whose return value is passed back to the caller and,
    /// for return-value targets, becomes the new state.
    pub fn returns<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut M, &Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.descriptor.body = Arc::new(body);
        self
    }

    /// Finish the declaration. The field is bound when the descriptor is
    /// registered.
    pub fn build(self) -> TransitionDescriptor<M> {
        self.descriptor
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Capabilities;

    #[derive(Debug, Default)]
    struct Post {
        title: String,
        publish_count: u32,
    }

    struct Wrapper {
        post: Post,
    }

    #[test]
    fn builder_defaults() {
        let t: TransitionDescriptor<Post> = TransitionDescriptor::builder("touch").build();
        assert_eq!(t.name(), "touch");
        assert_eq!(t.source(), &SourceSpec::Any);
        assert!(matches!(t.target(), TargetSpec::Unchanged));
        assert!(t.conditions().is_empty());
        assert!(t.permission().is_none());
        assert!(t.on_error().is_none());
        assert!(t.has_perm(&Post::default(), &Capabilities::none()));
    }

    #[test]
    fn builder_collects_declaration() {
        let t: TransitionDescriptor<Post> = TransitionDescriptor::builder("publish")
            .source("new")
            .target("published")
            .condition("has_title", |p: &Post| !p.title.is_empty())
            .permission("blog.publish")
            .on_error("failed")
            .custom("label", "Publish now")
            .build();
        assert_eq!(t.source(), &SourceSpec::state("new"));
        assert_eq!(t.target().static_value(), Some(&StateValue::from("published")));
        assert_eq!(t.conditions()[0].name(), "has_title");
        assert_eq!(t.on_error(), Some(&StateValue::from("failed")));
        assert_eq!(t.custom_value("label"), Some(&Value::from("Publish now")));
        assert!(!t.has_perm(&Post::default(), &Capabilities::none()));
        assert!(t.has_perm(&Post::default(), &Capabilities::new(["blog.publish"])));
    }

    #[test]
    fn accepts_uses_static_target_for_except_target() {
        let t: TransitionDescriptor<Post> = TransitionDescriptor::builder("remove")
            .source("+")
            .target("removed")
            .build();
        assert!(t.accepts(&StateValue::from("new")));
        assert!(!t.accepts(&StateValue::from("removed")));
    }

    #[test]
    fn fallible_condition_surfaces_error() {
        let c: Condition<Post> = Condition::fallible("remote_check", |_| anyhow::bail!("timeout"));
        assert!(c.evaluate(&Post::default()).is_err());
    }

    #[test]
    fn lift_projects_through_view() {
        let t: TransitionDescriptor<Post> = TransitionDescriptor::builder("publish")
            .condition("has_title", |p: &Post| !p.title.is_empty())
            .computed(["published", "draft"], |p: &Post, _| {
                StateValue::from(if p.publish_count > 0 { "published" } else { "draft" })
            })
            .body(|p: &mut Post, _| {
                p.publish_count += 1;
                Ok(())
            })
            .build();
        let lifted: TransitionDescriptor<Wrapper> =
            t.lift(|w: &Wrapper| &w.post, |w: &mut Wrapper| &mut w.post);

        let mut wrapper = Wrapper {
            post: Post {
                title: "Hello".into(),
                publish_count: 0,
            },
        };
        assert!(lifted.conditions()[0].evaluate(&wrapper).unwrap());
        (lifted.body())(&mut wrapper, &Invocation::new()).unwrap();
        assert_eq!(wrapper.post.publish_count, 1);
        let target = lifted
            .target()
            .resolve(&wrapper, &Value::Null, &Invocation::new())
            .unwrap();
        assert_eq!(target, Some(StateValue::from("published")));
    }

    #[test]
    fn equality_is_by_name_and_field() {
        let a: TransitionDescriptor<Post> = TransitionDescriptor::builder("publish").build();
        let b: TransitionDescriptor<Post> =
            TransitionDescriptor::builder("publish").target("x").build();
        assert_eq!(a, b);
    }
}
