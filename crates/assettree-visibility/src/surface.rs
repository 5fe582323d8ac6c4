use assettree_core::{CategoryId, CategoryOverride, ElementId, ModelId};
use assettree_events::{Event, EventBus};
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Display state owned by the viewer: which models are displayed, the
/// per-element always/never-drawn override lists and the per-(model, category)
/// override flags.
///
/// Reads and writes are suspension points; the resolver reads every set it
/// needs once per call and writes each changed set back once.
#[async_trait]
pub trait RenderingSurface: Send + Sync {
    /// Whether the view shows spatial content at all. Non-spatial views
    /// resolve every model and container to `Disabled`.
    async fn is_spatial(&self) -> bool;

    async fn displayed_models(&self) -> HashSet<ModelId>;

    async fn is_model_displayed(&self, model_id: ModelId) -> bool {
        self.displayed_models().await.contains(&model_id)
    }

    async fn set_models_displayed(&self, model_ids: &[ModelId], displayed: bool);

    async fn always_drawn(&self) -> HashSet<ElementId>;

    /// When set, only always-drawn elements are shown.
    async fn is_always_drawn_exclusive(&self) -> bool;

    async fn never_drawn(&self) -> HashSet<ElementId>;

    async fn set_always_drawn(&self, element_ids: HashSet<ElementId>, exclusive: bool);

    async fn set_never_drawn(&self, element_ids: HashSet<ElementId>);

    async fn category_override(&self, model_id: ModelId, category_id: CategoryId)
    -> CategoryOverride;

    async fn set_category_override(
        &self,
        model_id: ModelId,
        category_ids: &[CategoryId],
        value: CategoryOverride,
    );

    async fn clear_category_overrides(&self, model_id: ModelId);

    /// Categories switched on in the viewer's category selector.
    async fn enabled_categories(&self) -> HashSet<CategoryId>;

    /// Change notifications for this surface. Every call returns a fresh
    /// receiver that sees every later change.
    fn subscribe(&self) -> Receiver<Event>;
}

#[derive(Debug, Default)]
struct SurfaceState {
    spatial: bool,
    displayed_models: HashSet<ModelId>,
    always_drawn: HashSet<ElementId>,
    always_drawn_exclusive: bool,
    never_drawn: HashSet<ElementId>,
    category_overrides: HashMap<(ModelId, CategoryId), CategoryOverride>,
    enabled_categories: HashSet<CategoryId>,
}

/// Rendering surface keeping its state in memory. Every change publishes an
/// [`Event`] to each current subscriber.
pub struct InMemorySurface {
    state: RwLock<SurfaceState>,
    bus: EventBus,
}

impl Default for InMemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySurface {
    /// A spatial surface with nothing displayed and no overrides.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SurfaceState {
                spatial: true,
                ..SurfaceState::default()
            }),
            bus: EventBus::new(),
        }
    }

    pub fn with_displayed_models(self, model_ids: impl IntoIterator<Item = ModelId>) -> Self {
        self.state.write().displayed_models.extend(model_ids);
        self
    }

    pub fn with_enabled_categories(
        self,
        category_ids: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        self.state.write().enabled_categories.extend(category_ids);
        self
    }

    pub fn with_spatial(self, spatial: bool) -> Self {
        self.state.write().spatial = spatial;
        self
    }

    pub fn set_spatial(&self, spatial: bool) {
        self.state.write().spatial = spatial;
        self.bus.publish(Event::ViewContextChanged { spatial });
    }

    pub fn set_category_enabled(&self, category_id: CategoryId, enabled: bool) {
        {
            let mut state = self.state.write();
            if enabled {
                state.enabled_categories.insert(category_id);
            } else {
                state.enabled_categories.remove(&category_id);
            }
        }
        self.bus.publish(Event::EnabledCategoriesChanged);
    }

    /// Announce that the dataset behind the tree changed.
    pub fn notify_dataset_changed(&self) {
        self.bus.publish(Event::DatasetChanged);
    }
}

#[async_trait]
impl RenderingSurface for InMemorySurface {
    async fn is_spatial(&self) -> bool {
        self.state.read().spatial
    }

    async fn displayed_models(&self) -> HashSet<ModelId> {
        self.state.read().displayed_models.clone()
    }

    async fn is_model_displayed(&self, model_id: ModelId) -> bool {
        self.state.read().displayed_models.contains(&model_id)
    }

    async fn set_models_displayed(&self, model_ids: &[ModelId], displayed: bool) {
        {
            let mut state = self.state.write();
            for model_id in model_ids {
                if displayed {
                    state.displayed_models.insert(*model_id);
                } else {
                    state.displayed_models.remove(model_id);
                }
            }
        }
        self.bus.publish(Event::DisplayedModelsChanged {
            model_ids: model_ids.to_vec(),
            displayed,
        });
    }

    async fn always_drawn(&self) -> HashSet<ElementId> {
        self.state.read().always_drawn.clone()
    }

    async fn is_always_drawn_exclusive(&self) -> bool {
        self.state.read().always_drawn_exclusive
    }

    async fn never_drawn(&self) -> HashSet<ElementId> {
        self.state.read().never_drawn.clone()
    }

    async fn set_always_drawn(&self, element_ids: HashSet<ElementId>, exclusive: bool) {
        let count = element_ids.len();
        {
            let mut state = self.state.write();
            state.always_drawn = element_ids;
            state.always_drawn_exclusive = exclusive;
        }
        self.bus
            .publish(Event::AlwaysDrawnChanged { count, exclusive });
    }

    async fn set_never_drawn(&self, element_ids: HashSet<ElementId>) {
        let count = element_ids.len();
        self.state.write().never_drawn = element_ids;
        self.bus.publish(Event::NeverDrawnChanged { count });
    }

    async fn category_override(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
    ) -> CategoryOverride {
        self.state
            .read()
            .category_overrides
            .get(&(model_id, category_id))
            .copied()
            .unwrap_or_default()
    }

    async fn set_category_override(
        &self,
        model_id: ModelId,
        category_ids: &[CategoryId],
        value: CategoryOverride,
    ) {
        {
            let mut state = self.state.write();
            for category_id in category_ids {
                if value == CategoryOverride::None {
                    state.category_overrides.remove(&(model_id, *category_id));
                } else {
                    state
                        .category_overrides
                        .insert((model_id, *category_id), value);
                }
            }
        }
        self.bus.publish(Event::CategoryOverridesChanged {
            model_id,
            category_ids: category_ids.to_vec(),
        });
    }

    async fn clear_category_overrides(&self, model_id: ModelId) {
        let cleared: Vec<CategoryId> = {
            let mut state = self.state.write();
            let cleared = state
                .category_overrides
                .keys()
                .filter(|(model, _)| *model == model_id)
                .map(|(_, category)| *category)
                .collect::<Vec<_>>();
            for category_id in &cleared {
                state.category_overrides.remove(&(model_id, *category_id));
            }
            cleared
        };
        if !cleared.is_empty() {
            self.bus.publish(Event::CategoryOverridesChanged {
                model_id,
                category_ids: cleared,
            });
        }
    }

    async fn enabled_categories(&self) -> HashSet<CategoryId> {
        self.state.read().enabled_categories.clone()
    }

    fn subscribe(&self) -> Receiver<Event> {
        self.bus.subscribe()
    }
}
