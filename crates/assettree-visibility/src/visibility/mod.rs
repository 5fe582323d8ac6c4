//! Tri-state display status of tree nodes and the mutations behind the
//! tree's visibility toggles.
//!
//! Statuses are derived on every call from the rendering surface's override
//! records and the cached structural counts; nothing is stored.

use crate::cache::GraphIndexCache;
use crate::error::TreeResult;
use crate::surface::RenderingSurface;
use assettree_core::{ElementId, NodeKey, TreeNode, VisibilityStatus};
use assettree_events::telemetry::{
    OP_CHANGE_VISIBILITY, new_correlation_id, operation_failure, operation_start,
    operation_success,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

mod change;
pub mod overrides;
pub mod rules;
mod status;

use rules::ScopeCounts;

use overrides::{
    CategoryProps, ContainerProps, ElementProps, GroupingProps, ModelProps, VisibilityOverrides,
};

const RESOLVER_TARGET: &str = "assettree::visibility::resolver";

/// The always/never-drawn sets as read from the surface at the start of one
/// call. Mutations edit a copy and write back what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OverrideSets {
    always: HashSet<ElementId>,
    never: HashSet<ElementId>,
    exclusive: bool,
}

impl OverrideSets {
    async fn read(surface: &dyn RenderingSurface) -> Self {
        Self {
            always: surface.always_drawn().await,
            never: surface.never_drawn().await,
            exclusive: surface.is_always_drawn_exclusive().await,
        }
    }

    /// Exclusive mode only hides anything while the always-drawn set is
    /// non-empty.
    fn exclusive_active(&self) -> bool {
        self.exclusive && !self.always.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.always.is_empty() && self.never.is_empty()
    }

    /// Override counts over `ids`. An element in both sets is never drawn,
    /// so it only counts as such.
    fn counts_among<'a>(
        &self,
        total: u64,
        ids: impl IntoIterator<Item = &'a ElementId>,
    ) -> ScopeCounts {
        let mut counts = ScopeCounts {
            total,
            always: 0,
            never: 0,
        };
        for id in ids {
            if self.never.contains(id) {
                counts.never += 1;
            } else if self.always.contains(id) {
                counts.always += 1;
            }
        }
        counts
    }

    fn candidates(&self) -> HashSet<ElementId> {
        self.always.union(&self.never).copied().collect()
    }

    async fn write_back(self, surface: &dyn RenderingSurface, before: &OverrideSets) {
        if self.always != before.always || self.exclusive != before.exclusive {
            surface.set_always_drawn(self.always, self.exclusive).await;
        }
        if self.never != before.never {
            surface.set_never_drawn(self.never).await;
        }
    }
}

struct ResolverInner {
    cache: Arc<GraphIndexCache>,
    surface: Arc<dyn RenderingSurface>,
    overrides: VisibilityOverrides,
}

/// Resolves and changes the display status of tree nodes.
#[derive(Clone)]
pub struct VisibilityResolver {
    inner: Arc<ResolverInner>,
}

impl VisibilityResolver {
    pub fn new(
        cache: Arc<GraphIndexCache>,
        surface: Arc<dyn RenderingSurface>,
        overrides: VisibilityOverrides,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                cache,
                surface,
                overrides,
            }),
        }
    }

    pub fn surface(&self) -> &Arc<dyn RenderingSurface> {
        &self.inner.surface
    }

    /// # Panics
    ///
    /// Panics when a category, element or grouping node lacks the model
    /// context it was built with.
    pub async fn get_visibility_status(&self, node: &TreeNode) -> TreeResult<VisibilityStatus> {
        match &node.key {
            NodeKey::Containers(ids) => {
                self.inner
                    .container_status(ContainerProps {
                        container_ids: ids.clone(),
                    })
                    .await
            }
            NodeKey::Model(model_id) => {
                self.inner
                    .model_status(ModelProps {
                        model_id: *model_id,
                    })
                    .await
            }
            NodeKey::Categories(_) => self.inner.category_status(category_props(node)).await,
            NodeKey::Element(_) => self.inner.element_status(element_props(node)).await,
            NodeKey::ClassGrouping { .. } => self.inner.grouping_status(grouping_props(node)).await,
        }
    }

    /// Shows (`on`) or hides the node and everything below it. A no-op in a
    /// non-spatial view.
    ///
    /// # Panics
    ///
    /// Same as [`get_visibility_status`](Self::get_visibility_status).
    pub async fn change_visibility(&self, node: &TreeNode, on: bool) -> TreeResult<()> {
        if !self.inner.surface.is_spatial().await {
            debug!(
                target: RESOLVER_TARGET,
                node = ?node.key,
                "view is not spatial, ignoring visibility change"
            );
            return Ok(());
        }

        let correlation_id = new_correlation_id();
        let started = Instant::now();
        operation_start(
            OP_CHANGE_VISIBILITY,
            &correlation_id,
            &format!("{} -> {}", node.label, if on { "on" } else { "off" }),
        );

        let result = match &node.key {
            NodeKey::Containers(ids) => {
                self.inner
                    .change_container(
                        ContainerProps {
                            container_ids: ids.clone(),
                        },
                        on,
                    )
                    .await
            }
            NodeKey::Model(model_id) => {
                self.inner
                    .change_model(
                        ModelProps {
                            model_id: *model_id,
                        },
                        on,
                    )
                    .await
            }
            NodeKey::Categories(_) => self.inner.change_category(category_props(node), on).await,
            NodeKey::Element(_) => self.inner.change_element(element_props(node), on).await,
            NodeKey::ClassGrouping { .. } => {
                self.inner.change_grouping(grouping_props(node), on).await
            }
        };

        match &result {
            Ok(()) => {
                operation_success(
                    OP_CHANGE_VISIBILITY,
                    &correlation_id,
                    Some(started.elapsed().as_millis()),
                );
            }
            Err(err) => {
                operation_failure(OP_CHANGE_VISIBILITY, &correlation_id, Some(err.to_string()));
            }
        }
        result
    }
}

fn category_props(node: &TreeNode) -> CategoryProps {
    let NodeKey::Categories(category_ids) = &node.key else {
        unreachable!("category props requested for {:?}", node.key);
    };
    assert!(
        !node.context.model_ids.is_empty(),
        "category node {category_ids:?} has no model context"
    );
    CategoryProps {
        category_ids: category_ids.clone(),
        model_ids: node.context.model_ids.clone(),
    }
}

fn element_props(node: &TreeNode) -> ElementProps {
    let NodeKey::Element(element_id) = &node.key else {
        unreachable!("element props requested for {:?}", node.key);
    };
    let (Some(model_id), Some(category_id)) =
        (node.context.model_ids.first(), node.context.category_id)
    else {
        panic!("element node {element_id} has no model or category context");
    };
    ElementProps {
        element_id: *element_id,
        model_id: *model_id,
        category_id,
        sub_model_id: node.context.sub_model_id,
    }
}

fn grouping_props(node: &TreeNode) -> GroupingProps {
    let NodeKey::ClassGrouping { element_ids, .. } = &node.key else {
        unreachable!("grouping props requested for {:?}", node.key);
    };
    let (Some(model_id), Some(category_id)) =
        (node.context.model_ids.first(), node.context.category_id)
    else {
        panic!("grouping node {:?} has no model or category context", node.label);
    };
    GroupingProps {
        element_ids: element_ids.clone(),
        model_id: *model_id,
        category_id,
    }
}
