use super::overrides::{
    CategoryProps, ChangeFuture, ContainerProps, ElementProps, GroupingProps, ModelProps,
    dispatch_change,
};
use super::{OverrideSets, RESOLVER_TARGET, ResolverInner};
use crate::error::TreeResult;
use assettree_core::{CategoryId, CategoryOverride, ElementId, ModelId, VisibilityStatus};
use std::sync::Arc;
use tracing::debug;

impl ResolverInner {
    pub(super) fn change_container(
        self: &Arc<Self>,
        props: ContainerProps,
        on: bool,
    ) -> ChangeFuture {
        let inner = Arc::clone(self);
        dispatch_change(
            self.overrides.change_container.as_ref(),
            props,
            on,
            move |props, on| inner.default_change_container(props, on),
        )
    }

    pub(super) fn change_model(self: &Arc<Self>, props: ModelProps, on: bool) -> ChangeFuture {
        let inner = Arc::clone(self);
        dispatch_change(
            self.overrides.change_model.as_ref(),
            props,
            on,
            move |props, on| inner.default_change_model(props, on),
        )
    }

    pub(super) fn change_category(
        self: &Arc<Self>,
        props: CategoryProps,
        on: bool,
    ) -> ChangeFuture {
        let inner = Arc::clone(self);
        dispatch_change(
            self.overrides.change_category.as_ref(),
            props,
            on,
            move |props, on| inner.default_change_category(props, on),
        )
    }

    pub(super) fn change_element(
        self: &Arc<Self>,
        props: ElementProps,
        on: bool,
    ) -> ChangeFuture {
        let inner = Arc::clone(self);
        dispatch_change(
            self.overrides.change_element.as_ref(),
            props,
            on,
            move |props, on| inner.default_change_element(props, on),
        )
    }

    pub(super) fn change_grouping(
        self: &Arc<Self>,
        props: GroupingProps,
        on: bool,
    ) -> ChangeFuture {
        let inner = Arc::clone(self);
        dispatch_change(
            self.overrides.change_grouping.as_ref(),
            props,
            on,
            move |props, on| inner.default_change_grouping(props, on),
        )
    }

    async fn default_change_container(
        self: Arc<Self>,
        props: ContainerProps,
        on: bool,
    ) -> TreeResult<()> {
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

        for model_id in model_ids {
            self.change_model(ModelProps { model_id }, on).await?;
        }
        for child_id in child_ids {
            self.change_container(
                ContainerProps {
                    container_ids: vec![child_id],
                },
                on,
            )
            .await?;
        }
        Ok(())
    }

    async fn default_change_model(self: Arc<Self>, props: ModelProps, on: bool) -> TreeResult<()> {
        let model_id = props.model_id;
        if !on {
            self.surface.set_models_displayed(&[model_id], false).await;
            return Ok(());
        }

        let category_ids = self.cache.get_model_categories(model_id).await?;
        let categories = CategoryProps {
            category_ids,
            model_ids: vec![model_id],
        };
        if categories.category_ids.is_empty() || self.overrides.change_category.is_some() {
            self.surface.clear_category_overrides(model_id).await;
            self.surface.set_models_displayed(&[model_id], true).await;
            if categories.category_ids.is_empty() {
                return Ok(());
            }
            return self.change_category(categories, true).await;
        }

        // Planned before the first write, against the model as shown with
        // cleared overrides.
        let plan = self
            .plan_category_change(&categories, true, Some(model_id))
            .await?;
        self.surface.clear_category_overrides(model_id).await;
        self.surface.set_models_displayed(&[model_id], true).await;
        self.apply_category_change(plan, true).await;
        Ok(())
    }

    async fn default_change_category(
        self: Arc<Self>,
        props: CategoryProps,
        on: bool,
    ) -> TreeResult<()> {
        let plan = self.plan_category_change(&props, on, None).await?;
        self.apply_category_change(plan, on).await;
        Ok(())
    }

    /// Runs every lookup a category change needs and records the surface
    /// writes without applying any. `shown` is a model treated as displayed
    /// with no category overrides.
    async fn plan_category_change(
        &self,
        props: &CategoryProps,
        on: bool,
        shown: Option<ModelId>,
    ) -> TreeResult<CategoryChangePlan> {
        let before = OverrideSets::read(&*self.surface).await;
        let mut sets = before.clone();
        let enabled = self.surface.enabled_categories().await;
        let mut models = Vec::with_capacity(props.model_ids.len());

        for model_id in &props.model_ids {
            let model_id = *model_id;
            let model_categories = self.cache.get_model_categories(model_id).await?;
            let category_ids: Vec<CategoryId> = props
                .category_ids
                .iter()
                .filter(|id| model_categories.contains(*id))
                .copied()
                .collect();
            if category_ids.is_empty() {
                continue;
            }

            let displayed =
                shown == Some(model_id) || self.surface.is_model_displayed(model_id).await;
            let hide_first = if on && !displayed {
                Some(self.drop_stray_always_drawn(model_id, &mut sets).await?)
            } else {
                None
            };

            // An override equal to the selector state is dropped.
            let (redundant, explicit): (Vec<CategoryId>, Vec<CategoryId>) = category_ids
                .iter()
                .copied()
                .partition(|id| enabled.contains(id) == on);

            for category_id in category_ids {
                self.reset_pair_overrides(model_id, category_id, on, &mut sets)
                    .await?;
            }
            models.push(ModelCategoryChange {
                model_id,
                hide_first,
                explicit,
                redundant,
            });
        }

        Ok(CategoryChangePlan {
            before,
            sets,
            models,
        })
    }

    async fn apply_category_change(&self, plan: CategoryChangePlan, on: bool) {
        let value = if on {
            CategoryOverride::Show
        } else {
            CategoryOverride::Hide
        };
        for change in &plan.models {
            if let Some(category_ids) = &change.hide_first {
                self.show_model_with_categories_hidden(change.model_id, category_ids)
                    .await;
            }
            if !change.explicit.is_empty() {
                self.surface
                    .set_category_override(change.model_id, &change.explicit, value)
                    .await;
            }
            if !change.redundant.is_empty() {
                self.surface
                    .set_category_override(
                        change.model_id,
                        &change.redundant,
                        CategoryOverride::None,
                    )
                    .await;
            }
        }
        plan.sets.write_back(&*self.surface, &plan.before).await;
    }

    /// Drops the element overrides of one (model, category) tree level. In
    /// exclusive mode showing the level lists all of its elements instead.
    async fn reset_pair_overrides(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
        on: bool,
        sets: &mut OverrideSets,
    ) -> TreeResult<()> {
        if on && sets.exclusive {
            let scope = self
                .cache
                .get_scope_elements(model_id, Some(category_id), None)
                .await?;
            sets.never.retain(|id| !scope.contains(id));
            sets.always.extend(scope);
            return Ok(());
        }
        if sets.is_empty() {
            return Ok(());
        }

        let candidates = sets.candidates();
        let scope = self
            .cache
            .get_scope_elements(model_id, Some(category_id), Some(&candidates))
            .await?;
        sets.always.retain(|id| !scope.contains(id));
        sets.never.retain(|id| !scope.contains(id));
        Ok(())
    }

    /// First half of showing a hidden model without revealing its categories:
    /// removes the model's always-drawn entries from `sets` and returns the
    /// categories to override hidden.
    async fn drop_stray_always_drawn(
        &self,
        model_id: ModelId,
        sets: &mut OverrideSets,
    ) -> TreeResult<Vec<CategoryId>> {
        if !sets.always.is_empty() {
            let stray = self
                .cache
                .get_scope_elements(model_id, None, Some(&sets.always))
                .await?;
            sets.always.retain(|id| !stray.contains(id));
        }
        self.cache.get_model_categories(model_id).await
    }

    /// Displays a model with the given categories overridden hidden, so that
    /// showing one category or element does not reveal its siblings.
    async fn show_model_with_categories_hidden(
        &self,
        model_id: ModelId,
        category_ids: &[CategoryId],
    ) {
        if !category_ids.is_empty() {
            self.surface
                .set_category_override(model_id, category_ids, CategoryOverride::Hide)
                .await;
        }
        self.surface.set_models_displayed(&[model_id], true).await;
        debug!(
            target: RESOLVER_TARGET,
            model = %model_id,
            categories = category_ids.len(),
            "model shown with categories hidden"
        );
    }

    async fn default_change_element(
        self: Arc<Self>,
        props: ElementProps,
        on: bool,
    ) -> TreeResult<()> {
        self.change_elements(
            props.model_id,
            props.category_id,
            &[props.element_id],
            on,
        )
        .await?;
        if let Some(sub_model_id) = props.sub_model_id {
            self.change_model(
                ModelProps {
                    model_id: sub_model_id,
                },
                on,
            )
            .await?;
        }
        Ok(())
    }

    async fn default_change_grouping(
        self: Arc<Self>,
        props: GroupingProps,
        on: bool,
    ) -> TreeResult<()> {
        self.change_elements(props.model_id, props.category_id, &props.element_ids, on)
            .await
    }

    /// Element overrides of one (model, category) level, sharing a single
    /// read and write of the override sets.
    async fn change_elements(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
        element_ids: &[ElementId],
        on: bool,
    ) -> TreeResult<()> {
        let before = OverrideSets::read(&*self.surface).await;
        let mut sets = before.clone();

        let hide_first = if on && !self.surface.is_model_displayed(model_id).await {
            Some(self.drop_stray_always_drawn(model_id, &mut sets).await?)
        } else {
            None
        };
        let default_status = match &hide_first {
            Some(hidden) if hidden.contains(&category_id) => VisibilityStatus::Hidden,
            Some(_) => self.shown_category_default_status(model_id, category_id).await,
            None => self.category_default_status(model_id, category_id).await,
        };

        if on {
            let list = default_status == VisibilityStatus::Hidden || sets.exclusive;
            for id in element_ids {
                sets.never.remove(id);
                if list {
                    sets.always.insert(*id);
                }
            }
        } else {
            let list = default_status == VisibilityStatus::Visible && !sets.exclusive;
            for id in element_ids {
                sets.always.remove(id);
                if list {
                    sets.never.insert(*id);
                }
            }
        }

        if let Some(category_ids) = &hide_first {
            self.show_model_with_categories_hidden(model_id, category_ids)
                .await;
        }
        sets.write_back(&*self.surface, &before).await;
        Ok(())
    }
}

/// Surface writes of one category change, collected before any is applied.
struct CategoryChangePlan {
    before: OverrideSets,
    sets: OverrideSets,
    models: Vec<ModelCategoryChange>,
}

struct ModelCategoryChange {
    model_id: ModelId,
    /// Categories to override hidden while showing the model first.
    hide_first: Option<Vec<CategoryId>>,
    explicit: Vec<CategoryId>,
    redundant: Vec<CategoryId>,
}
