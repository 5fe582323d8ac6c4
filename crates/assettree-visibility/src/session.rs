use crate::cache::GraphIndexCache;
use crate::config::TreeConfig;
use crate::hierarchy::HierarchyDefinition;
use crate::surface::RenderingSurface;
use crate::visibility::VisibilityResolver;
use crate::visibility::overrides::VisibilityOverrides;
use assettree_events::{Event, EventListener, dispatch_pending};
use assettree_storage::BackingStore;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::debug;

const SESSION_TARGET: &str = "assettree::visibility::session";

/// One tree bound to one backing store and one rendering surface. Owns the
/// index cache shared by the hierarchy definition and the resolver; dropping
/// the session drops both.
pub struct TreeSession {
    cache: Arc<GraphIndexCache>,
    hierarchy: HierarchyDefinition,
    resolver: VisibilityResolver,
    events: Receiver<Event>,
}

impl TreeSession {
    pub fn new(
        store: Arc<dyn BackingStore>,
        surface: Arc<dyn RenderingSurface>,
        config: TreeConfig,
        overrides: VisibilityOverrides,
    ) -> Self {
        let cache = Arc::new(GraphIndexCache::new(store));
        let events = surface.subscribe();
        let hierarchy = HierarchyDefinition::new(Arc::clone(&cache), config);
        let resolver = VisibilityResolver::new(Arc::clone(&cache), surface, overrides);
        Self {
            cache,
            hierarchy,
            resolver,
            events,
        }
    }

    pub fn cache(&self) -> &Arc<GraphIndexCache> {
        &self.cache
    }

    pub fn hierarchy(&self) -> &HierarchyDefinition {
        &self.hierarchy
    }

    pub fn resolver(&self) -> &VisibilityResolver {
        &self.resolver
    }

    /// Handles every pending surface notification. Returns how many were
    /// handled.
    pub fn pump_events(&mut self) -> usize {
        let events = self.events.clone();
        dispatch_pending(&events, self)
    }
}

impl EventListener for TreeSession {
    fn handle_event(&mut self, event: &Event) {
        if event.invalidates_structure() {
            self.hierarchy.cancel_label_search();
            self.cache.invalidate();
        } else {
            debug!(target: SESSION_TARGET, event = ?event, "display state changed");
        }
    }
}
