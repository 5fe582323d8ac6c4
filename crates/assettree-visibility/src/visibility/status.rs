use super::overrides::{
    CategoryProps, ContainerProps, ElementProps, GroupingProps, ModelProps, StatusFuture,
    dispatch_status,
};
use super::rules::{ScopeCounts, status_from_override_counts};
use super::{OverrideSets, RESOLVER_TARGET, ResolverInner};
use crate::error::TreeResult;
use assettree_core::{CategoryId, CategoryOverride, ModelId, VisibilityStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

impl ResolverInner {
    pub(super) fn container_status(self: &Arc<Self>, props: ContainerProps) -> StatusFuture {
        let inner = Arc::clone(self);
        dispatch_status(
            self.overrides.container_status.as_ref(),
            props,
            move |props| inner.default_container_status(props),
        )
    }

    pub(super) fn model_status(self: &Arc<Self>, props: ModelProps) -> StatusFuture {
        let inner = Arc::clone(self);
        dispatch_status(
            self.overrides.model_status.as_ref(),
            props,
            move |props| inner.default_model_status(props),
        )
    }

    pub(super) fn category_status(self: &Arc<Self>, props: CategoryProps) -> StatusFuture {
        let inner = Arc::clone(self);
        dispatch_status(
            self.overrides.category_status.as_ref(),
            props,
            move |props| inner.default_category_status(props),
        )
    }

    pub(super) fn element_status(self: &Arc<Self>, props: ElementProps) -> StatusFuture {
        let inner = Arc::clone(self);
        dispatch_status(
            self.overrides.element_status.as_ref(),
            props,
            move |props| inner.default_element_status(props),
        )
    }

    pub(super) fn grouping_status(self: &Arc<Self>, props: GroupingProps) -> StatusFuture {
        let inner = Arc::clone(self);
        dispatch_status(
            self.overrides.grouping_status.as_ref(),
            props,
            move |props| inner.default_grouping_status(props),
        )
    }

    /// Status a category's elements have without element overrides: the
    /// per-model override if set, otherwise hidden for an undisplayed model,
    /// otherwise the category selector state.
    pub(super) async fn category_default_status(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
    ) -> VisibilityStatus {
        if !self.surface.is_model_displayed(model_id).await
            && self.surface.category_override(model_id, category_id).await
                == CategoryOverride::None
        {
            return VisibilityStatus::Hidden;
        }
        self.shown_category_default_status(model_id, category_id)
            .await
    }

    /// Same as [`category_default_status`](Self::category_default_status)
    /// for a model that is displayed or about to be.
    pub(super) async fn shown_category_default_status(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
    ) -> VisibilityStatus {
        match self.surface.category_override(model_id, category_id).await {
            CategoryOverride::Show => VisibilityStatus::Visible,
            CategoryOverride::Hide => VisibilityStatus::Hidden,
            CategoryOverride::None => {
                let enabled = self.surface.enabled_categories().await;
                VisibilityStatus::from_visible(enabled.contains(&category_id))
            }
        }
    }

    /// Counts of a whole model (`category_id == None`) or of one
    /// (model, category) tree level.
    async fn scope_counts(
        &self,
        model_id: ModelId,
        category_id: Option<CategoryId>,
        sets: &OverrideSets,
    ) -> TreeResult<ScopeCounts> {
        let total = match category_id {
            Some(category_id) => {
                self.cache
                    .get_category_element_count(model_id, category_id)
                    .await?
            }
            None => self.cache.get_model_element_count(model_id).await?,
        };
        if sets.is_empty() {
            return Ok(ScopeCounts {
                total,
                always: 0,
                never: 0,
            });
        }

        let candidates = sets.candidates();
        let in_scope = self
            .cache
            .get_scope_elements(model_id, category_id, Some(&candidates))
            .await?;
        Ok(sets.counts_among(total, &in_scope))
    }

    async fn default_container_status(
        self: Arc<Self>,
        props: ContainerProps,
    ) -> TreeResult<VisibilityStatus> {
        if !self.surface.is_spatial().await {
            return Ok(VisibilityStatus::Disabled);
        }

        let model_ids = self
            .cache
            .get_container_model_ids(&props.container_ids)
            .await?;
        let parents = self.cache.get_parent_container_ids().await?;
        let child_ids: Vec<_> = self
            .cache
            .get_child_container_ids(&props.container_ids)
            .await?
            .into_iter()
            .filter(|id| parents.contains(id))
            .collect();

        let mut statuses = Vec::with_capacity(model_ids.len() + child_ids.len());
        for model_id in model_ids {
            let status = self.model_status(ModelProps { model_id }).await?;
            if status == VisibilityStatus::Partial {
                return Ok(status);
            }
            statuses.push(status);
        }
        for child_id in child_ids {
            let status = self
                .container_status(ContainerProps {
                    container_ids: vec![child_id],
                })
                .await?;
            if status == VisibilityStatus::Partial {
                return Ok(status);
            }
            statuses.push(status);
        }
        Ok(VisibilityStatus::aggregate(statuses))
    }

    async fn default_model_status(
        self: Arc<Self>,
        props: ModelProps,
    ) -> TreeResult<VisibilityStatus> {
        let model_id = props.model_id;
        if !self.surface.is_spatial().await {
            return Ok(VisibilityStatus::Disabled);
        }
        if !self.surface.is_model_displayed(model_id).await {
            return Ok(VisibilityStatus::Hidden);
        }

        let mut defaults = HashSet::new();
        for category_id in self.cache.get_model_categories(model_id).await? {
            defaults.insert(self.category_default_status(model_id, category_id).await);
            if defaults.len() > 1 {
                debug!(
                    target: RESOLVER_TARGET,
                    model = %model_id,
                    "category defaults disagree"
                );
                return Ok(VisibilityStatus::Partial);
            }
        }
        let default_status = defaults
            .into_iter()
            .next()
            .unwrap_or(VisibilityStatus::Visible);

        let sets = OverrideSets::read(&*self.surface).await;
        let counts = self.scope_counts(model_id, None, &sets).await?;
        Ok(status_from_override_counts(
            counts,
            default_status,
            sets.exclusive_active(),
        ))
    }

    /// Every (model, category) pair of the node is resolved on its own and
    /// the pair statuses are aggregated.
    async fn default_category_status(
        self: Arc<Self>,
        props: CategoryProps,
    ) -> TreeResult<VisibilityStatus> {
        let sets = OverrideSets::read(&*self.surface).await;
        let mut statuses = Vec::new();
        for model_id in &props.model_ids {
            let model_categories = self.cache.get_model_categories(*model_id).await?;
            for category_id in &props.category_ids {
                if !model_categories.contains(category_id) {
                    continue;
                }
                statuses.push(self.pair_status(*model_id, *category_id, &sets).await?);
            }
        }
        Ok(VisibilityStatus::aggregate(statuses))
    }

    async fn pair_status(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
        sets: &OverrideSets,
    ) -> TreeResult<VisibilityStatus> {
        if !self.surface.is_model_displayed(model_id).await {
            return Ok(VisibilityStatus::Hidden);
        }
        let default_status = self.category_default_status(model_id, category_id).await;
        let counts = self.scope_counts(model_id, Some(category_id), sets).await?;
        Ok(status_from_override_counts(
            counts,
            default_status,
            sets.exclusive_active(),
        ))
    }

    async fn default_element_status(
        self: Arc<Self>,
        props: ElementProps,
    ) -> TreeResult<VisibilityStatus> {
        let own = if !self.surface.is_model_displayed(props.model_id).await {
            VisibilityStatus::Hidden
        } else {
            let sets = OverrideSets::read(&*self.surface).await;
            if sets.never.contains(&props.element_id) {
                VisibilityStatus::Hidden
            } else if sets.always.contains(&props.element_id) {
                VisibilityStatus::Visible
            } else if sets.exclusive_active() {
                VisibilityStatus::Hidden
            } else {
                self.category_default_status(props.model_id, props.category_id)
                    .await
            }
        };

        let Some(sub_model_id) = props.sub_model_id else {
            return Ok(own);
        };
        let sub_model = self
            .model_status(ModelProps {
                model_id: sub_model_id,
            })
            .await?;
        Ok(VisibilityStatus::aggregate([own, sub_model]))
    }

    async fn default_grouping_status(
        self: Arc<Self>,
        props: GroupingProps,
    ) -> TreeResult<VisibilityStatus> {
        if !self.surface.is_model_displayed(props.model_id).await {
            return Ok(VisibilityStatus::Hidden);
        }
        let sets = OverrideSets::read(&*self.surface).await;
        let counts = sets.counts_among(props.element_ids.len() as u64, &props.element_ids);
        let default_status = self
            .category_default_status(props.model_id, props.category_id)
            .await;
        Ok(status_from_override_counts(
            counts,
            default_status,
            sets.exclusive_active(),
        ))
    }
}
