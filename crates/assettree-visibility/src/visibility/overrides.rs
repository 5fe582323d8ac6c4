//! Caller-supplied interception points of the resolver.
//!
//! Each hook receives the operation's inputs and a closure running the
//! default algorithm. A hook may call it, ignore it, or blend its result.

use crate::error::TreeResult;
use assettree_core::{CategoryId, ContainerId, ElementId, ModelId, VisibilityStatus};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub type StatusFuture = BoxFuture<TreeResult<VisibilityStatus>>;
pub type ChangeFuture = BoxFuture<TreeResult<()>>;

/// Call-through to the default status algorithm.
pub type DefaultStatus = Box<dyn FnOnce() -> StatusFuture + Send>;
/// Call-through to the default mutation algorithm.
pub type DefaultChange = Box<dyn FnOnce() -> ChangeFuture + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProps {
    pub container_ids: Vec<ContainerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProps {
    pub model_id: ModelId,
}

/// A (possibly label-merged) category node and the models it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryProps {
    pub category_ids: Vec<CategoryId>,
    pub model_ids: Vec<ModelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementProps {
    pub element_id: ElementId,
    pub model_id: ModelId,
    pub category_id: CategoryId,
    pub sub_model_id: Option<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingProps {
    pub element_ids: Vec<ElementId>,
    pub model_id: ModelId,
    pub category_id: CategoryId,
}

/// Replaces one status computation.
pub struct StatusOverride<P>(Arc<dyn Fn(P, DefaultStatus) -> StatusFuture + Send + Sync>);

impl<P> StatusOverride<P> {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(P, DefaultStatus) -> StatusFuture + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub(crate) fn call(&self, props: P, default: DefaultStatus) -> StatusFuture {
        (self.0)(props, default)
    }
}

impl<P> Clone for StatusOverride<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> fmt::Debug for StatusOverride<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusOverride")
    }
}

/// Replaces one mutation; the `bool` is the requested display state.
pub struct ChangeOverride<P>(Arc<dyn Fn(P, bool, DefaultChange) -> ChangeFuture + Send + Sync>);

impl<P> ChangeOverride<P> {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(P, bool, DefaultChange) -> ChangeFuture + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub(crate) fn call(&self, props: P, on: bool, default: DefaultChange) -> ChangeFuture {
        (self.0)(props, on, default)
    }
}

impl<P> Clone for ChangeOverride<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> fmt::Debug for ChangeOverride<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeOverride")
    }
}

/// Strategy table with one optional hook per resolvable operation.
#[derive(Debug, Clone, Default)]
pub struct VisibilityOverrides {
    pub container_status: Option<StatusOverride<ContainerProps>>,
    pub model_status: Option<StatusOverride<ModelProps>>,
    pub category_status: Option<StatusOverride<CategoryProps>>,
    pub element_status: Option<StatusOverride<ElementProps>>,
    pub grouping_status: Option<StatusOverride<GroupingProps>>,

    pub change_container: Option<ChangeOverride<ContainerProps>>,
    pub change_model: Option<ChangeOverride<ModelProps>>,
    pub change_category: Option<ChangeOverride<CategoryProps>>,
    pub change_element: Option<ChangeOverride<ElementProps>>,
    pub change_grouping: Option<ChangeOverride<GroupingProps>>,
}

/// Runs `hook` with a call-through to `default`, or `default` alone.
pub(crate) fn dispatch_status<P, F, Fut>(
    hook: Option<&StatusOverride<P>>,
    props: P,
    default: F,
) -> StatusFuture
where
    P: Clone + Send + 'static,
    F: FnOnce(P) -> Fut + Send + 'static,
    Fut: Future<Output = TreeResult<VisibilityStatus>> + Send + 'static,
{
    match hook {
        Some(hook) => {
            let default_props = props.clone();
            let call_through: DefaultStatus =
                Box::new(move || -> StatusFuture { Box::pin(default(default_props)) });
            hook.call(props, call_through)
        }
        None => Box::pin(default(props)),
    }
}

pub(crate) fn dispatch_change<P, F, Fut>(
    hook: Option<&ChangeOverride<P>>,
    props: P,
    on: bool,
    default: F,
) -> ChangeFuture
where
    P: Clone + Send + 'static,
    F: FnOnce(P, bool) -> Fut + Send + 'static,
    Fut: Future<Output = TreeResult<()>> + Send + 'static,
{
    match hook {
        Some(hook) => {
            let default_props = props.clone();
            let call_through: DefaultChange =
                Box::new(move || -> ChangeFuture { Box::pin(default(default_props, on)) });
            hook.call(props, on, call_through)
        }
        None => Box::pin(default(props, on)),
    }
}
