//! Lazily populated indices over the containment graph.
//!
//! Every sub-index lives in a [`OnceCell`]: it is empty, being populated
//! (concurrent callers park on the cell and share the single in-flight
//! computation), or populated. [`GraphIndexCache::invalidate`] swaps in a
//! fresh generation of cells; computations still running against the old
//! generation finish into it and are dropped with it.

use crate::error::TreeResult;
use assettree_core::{CategoryId, ContainerId, ElementId, ModelId};
use assettree_storage::{BackingStore, QueryRow, StructuralQuery, placeholders};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const CACHE_TARGET: &str = "assettree::visibility::cache";

/// Keeps `IN (...)` lists well below SQLite's bound-parameter limit.
const MAX_BOUND_IDS: usize = 900;

const ALL_CONTAINERS_SQL: &str =
    "SELECT id, parent_id, hidden_in_hierarchy, json_properties FROM container";

const MODEL_PARTITIONS_SQL: &str =
    "SELECT m.id, m.owner_container_id, m.modeled_element_id, m.hidden_in_hierarchy
     FROM model m
     WHERE m.is_private = 0
       AND EXISTS (SELECT 1 FROM element e WHERE e.model_id = m.id)";

const MODEL_CATEGORIES_SQL: &str = "SELECT model_id, category_id FROM element
     WHERE parent_id IS NULL
     GROUP BY model_id, category_id
     ORDER BY model_id, category_id";

const MODEL_ELEMENT_COUNTS_SQL: &str =
    "SELECT model_id, COUNT(*) AS element_count FROM element GROUP BY model_id";

/// Root elements of one (model, category) pair plus every element whose
/// parent is already in scope.
const CATEGORY_SCOPE_CTE: &str = "WITH RECURSIVE scoped(id) AS (
         SELECT id FROM element WHERE model_id = ? AND category_id = ? AND parent_id IS NULL
         UNION ALL
         SELECT e.id FROM element e JOIN scoped s ON e.parent_id = s.id
     )";

/// What the cache knows about a displayable (non-private, non-empty) model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    /// Containers owning the model directly or claiming it via a target override.
    pub owners: Vec<ContainerId>,
    pub hidden_in_hierarchy: bool,
    /// Element the model is a sub-model of.
    pub modeled_element_id: Option<ElementId>,
}

#[derive(Debug, Default)]
struct ContainerIndex {
    roots: Vec<ContainerId>,
    parent_of: HashMap<ContainerId, ContainerId>,
    child_containers: HashMap<ContainerId, Vec<ContainerId>>,
    hidden: HashSet<ContainerId>,
    container_models: HashMap<ContainerId, Vec<ModelId>>,
    models: HashMap<ModelId, ModelInfo>,
    sub_models: HashMap<ElementId, ModelId>,
    parent_container_ids: HashSet<ContainerId>,
}

impl ContainerIndex {
    fn children(&self, id: ContainerId) -> &[ContainerId] {
        self.child_containers
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn models_of(&self, id: ContainerId) -> &[ModelId] {
        self.container_models
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct ModelCategoryIndex {
    model_categories: HashMap<ModelId, Vec<CategoryId>>,
    category_models: HashMap<CategoryId, Vec<ModelId>>,
    model_element_counts: HashMap<ModelId, u64>,
}

#[derive(Default)]
struct CacheGeneration {
    containers: OnceCell<Arc<ContainerIndex>>,
    model_categories: OnceCell<Arc<ModelCategoryIndex>>,
    category_element_counts: Mutex<HashMap<(ModelId, CategoryId), Arc<OnceCell<u64>>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerJsonProperties {
    #[serde(default)]
    subject: Option<SubjectProperties>,
}

#[derive(Debug, Default, Deserialize)]
struct SubjectProperties {
    #[serde(default)]
    model: Option<SubjectModelProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectModelProperties {
    #[serde(default)]
    target_partition: Option<i64>,
}

fn parse_target_override(container: ContainerId, json: &str) -> Option<ModelId> {
    match serde_json::from_str::<ContainerJsonProperties>(json) {
        Ok(props) => props
            .subject
            .and_then(|subject| subject.model)
            .and_then(|model| model.target_partition)
            .map(ModelId),
        Err(err) => {
            warn!(
                target: CACHE_TARGET,
                container = %container,
                error = %err,
                "ignoring malformed container json properties"
            );
            None
        }
    }
}

/// Derived indices over one backing store, shared by the hierarchy definition
/// and the visibility resolver of a tree session.
pub struct GraphIndexCache {
    store: Arc<dyn BackingStore>,
    generation: Mutex<Arc<CacheGeneration>>,
}

impl GraphIndexCache {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self {
            store,
            generation: Mutex::new(Arc::new(CacheGeneration::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Drops every memoized index; the next lookup recomputes from the store.
    pub fn invalidate(&self) {
        *self.generation.lock() = Arc::new(CacheGeneration::default());
        debug!(target: CACHE_TARGET, "graph index cache invalidated");
    }

    fn current(&self) -> Arc<CacheGeneration> {
        Arc::clone(&self.generation.lock())
    }

    async fn container_index(&self) -> TreeResult<Arc<ContainerIndex>> {
        let generation = self.current();
        let index = generation
            .containers
            .get_or_try_init(|| self.load_container_index())
            .await?;
        Ok(Arc::clone(index))
    }

    async fn model_category_index(&self) -> TreeResult<Arc<ModelCategoryIndex>> {
        let generation = self.current();
        let index = generation
            .model_categories
            .get_or_try_init(|| self.load_model_category_index())
            .await?;
        Ok(Arc::clone(index))
    }

    async fn load_container_index(&self) -> TreeResult<Arc<ContainerIndex>> {
        let containers_query = StructuralQuery::new("all_containers", ALL_CONTAINERS_SQL);
        let models_query = StructuralQuery::new("model_partitions", MODEL_PARTITIONS_SQL);
        let (container_rows, model_rows) = tokio::try_join!(
            self.store.query(&containers_query),
            self.store.query(&models_query)
        )?;

        let index = build_container_index(&container_rows, &model_rows)?;
        debug!(
            target: CACHE_TARGET,
            containers = container_rows.len(),
            hidden = index.hidden.len(),
            models = index.models.len(),
            parents = index.parent_container_ids.len(),
            "container index populated"
        );
        Ok(Arc::new(index))
    }

    async fn load_model_category_index(&self) -> TreeResult<Arc<ModelCategoryIndex>> {
        let categories_query = StructuralQuery::new("model_categories", MODEL_CATEGORIES_SQL);
        let counts_query = StructuralQuery::new("model_element_counts", MODEL_ELEMENT_COUNTS_SQL);
        let (category_rows, count_rows) = tokio::try_join!(
            self.store.query(&categories_query),
            self.store.query(&counts_query)
        )?;

        let mut index = ModelCategoryIndex::default();
        for row in &category_rows {
            let model_id = ModelId(row.i64("model_id")?);
            let category_id = CategoryId(row.i64("category_id")?);
            index
                .model_categories
                .entry(model_id)
                .or_default()
                .push(category_id);
            index
                .category_models
                .entry(category_id)
                .or_default()
                .push(model_id);
        }
        for row in &count_rows {
            let count = row.i64("element_count")?.max(0) as u64;
            index
                .model_element_counts
                .insert(ModelId(row.i64("model_id")?), count);
        }
        debug!(
            target: CACHE_TARGET,
            models = index.model_categories.len(),
            categories = index.category_models.len(),
            "model category index populated"
        );
        Ok(Arc::new(index))
    }

    async fn load_category_element_count(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
    ) -> TreeResult<u64> {
        let query = StructuralQuery::new(
            "category_element_count",
            format!("{CATEGORY_SCOPE_CTE} SELECT COUNT(*) AS element_count FROM scoped"),
        )
        .bind(model_id.0)
        .bind(category_id.0);
        let rows = self.store.query(&query).await?;
        let count = match rows.first() {
            Some(row) => row.i64("element_count")?.max(0) as u64,
            None => 0,
        };
        debug!(
            target: CACHE_TARGET,
            model = %model_id,
            category = %category_id,
            count,
            "category element count memoized"
        );
        Ok(count)
    }

    pub async fn get_root_container_ids(&self) -> TreeResult<Vec<ContainerId>> {
        Ok(self.container_index().await?.roots.clone())
    }

    /// Containers whose subtree, looking through hidden containers, owns at
    /// least one model.
    pub async fn get_parent_container_ids(&self) -> TreeResult<HashSet<ContainerId>> {
        Ok(self.container_index().await?.parent_container_ids.clone())
    }

    pub async fn is_hidden_container(&self, id: ContainerId) -> TreeResult<bool> {
        Ok(self.container_index().await?.hidden.contains(&id))
    }

    /// Nearest non-hidden descendants of each input container. Hidden
    /// containers are looked through and never returned.
    pub async fn get_child_container_ids(
        &self,
        ids: &[ContainerId],
    ) -> TreeResult<Vec<ContainerId>> {
        let index = self.container_index().await?;
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            let mut stack: Vec<ContainerId> = index.children(*id).iter().rev().copied().collect();
            while let Some(child) = stack.pop() {
                if index.hidden.contains(&child) {
                    stack.extend(index.children(child).iter().rev().copied());
                } else if seen.insert(child) {
                    result.push(child);
                }
            }
        }
        Ok(result)
    }

    /// Models owned by the input containers or lent to them by hidden
    /// descendants reachable before a non-hidden container.
    pub async fn get_container_model_ids(&self, ids: &[ContainerId]) -> TreeResult<Vec<ModelId>> {
        let index = self.container_index().await?;
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<ContainerId> = ids.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for model in index.models_of(id) {
                if seen.insert(*model) {
                    result.push(*model);
                }
            }
            stack.extend(
                index
                    .children(id)
                    .iter()
                    .rev()
                    .filter(|child| index.hidden.contains(child))
                    .copied(),
            );
        }
        Ok(result)
    }

    pub async fn get_model_info(&self, model_id: ModelId) -> TreeResult<Option<ModelInfo>> {
        Ok(self.container_index().await?.models.get(&model_id).cloned())
    }

    /// Displayable sub-model of an element, if any.
    pub async fn get_element_sub_model(
        &self,
        element_id: ElementId,
    ) -> TreeResult<Option<ModelId>> {
        Ok(self
            .container_index()
            .await?
            .sub_models
            .get(&element_id)
            .copied())
    }

    /// Root-to-container chain of visible containers ending at `id`, or at its
    /// nearest visible ancestor when `id` itself is hidden.
    pub async fn get_container_chain(&self, id: ContainerId) -> TreeResult<Vec<ContainerId>> {
        let index = self.container_index().await?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(id);
        while let Some(container) = current {
            if !visited.insert(container) {
                break;
            }
            if !index.hidden.contains(&container) {
                chain.push(container);
            }
            current = index.parent_of.get(&container).copied();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Categories of the model's root elements.
    pub async fn get_model_categories(&self, model_id: ModelId) -> TreeResult<Vec<CategoryId>> {
        Ok(self
            .model_category_index()
            .await?
            .model_categories
            .get(&model_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Models having root elements in the category.
    pub async fn get_category_models(&self, category_id: CategoryId) -> TreeResult<Vec<ModelId>> {
        Ok(self
            .model_category_index()
            .await?
            .category_models
            .get(&category_id)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get_model_element_count(&self, model_id: ModelId) -> TreeResult<u64> {
        Ok(self
            .model_category_index()
            .await?
            .model_element_counts
            .get(&model_id)
            .copied()
            .unwrap_or(0))
    }

    /// Number of elements under the (model, category) tree level: the pair's
    /// root elements and all of their descendants. Memoized per pair.
    pub async fn get_category_element_count(
        &self,
        model_id: ModelId,
        category_id: CategoryId,
    ) -> TreeResult<u64> {
        let generation = self.current();
        let cell = {
            let mut counts = generation.category_element_counts.lock();
            Arc::clone(counts.entry((model_id, category_id)).or_default())
        };
        let count = cell
            .get_or_try_init(|| self.load_category_element_count(model_id, category_id))
            .await?;
        Ok(*count)
    }

    /// Elements of a model, or of a (model, category) tree level, optionally
    /// restricted to `candidates`. Not memoized: candidate sets vary per call.
    pub async fn get_scope_elements(
        &self,
        model_id: ModelId,
        category_id: Option<CategoryId>,
        candidates: Option<&HashSet<ElementId>>,
    ) -> TreeResult<HashSet<ElementId>> {
        let base = |extra_filter: &str| match category_id {
            Some(_) => format!("{CATEGORY_SCOPE_CTE} SELECT id FROM scoped{extra_filter}"),
            None => format!(
                "SELECT id FROM element WHERE model_id = ?{}",
                extra_filter.replacen(" WHERE", " AND", 1)
            ),
        };
        let scope_bindings = |query: StructuralQuery| match category_id {
            Some(category) => query.bind(model_id.0).bind(category.0),
            None => query.bind(model_id.0),
        };

        let mut result = HashSet::new();
        match candidates {
            None => {
                let query = scope_bindings(StructuralQuery::new("scope_elements", base("")));
                for row in self.store.query(&query).await? {
                    result.insert(ElementId(row.i64("id")?));
                }
            }
            Some(candidates) if candidates.is_empty() => {}
            Some(candidates) => {
                let mut ids: Vec<i64> = candidates.iter().map(|id| id.0).collect();
                ids.sort_unstable();
                for chunk in ids.chunks(MAX_BOUND_IDS) {
                    let filter = format!(" WHERE id IN ({})", placeholders(chunk.len()));
                    let query = scope_bindings(StructuralQuery::new(
                        "scope_elements_among",
                        base(&filter),
                    ))
                    .bind_all(chunk.iter().copied());
                    for row in self.store.query(&query).await? {
                        result.insert(ElementId(row.i64("id")?));
                    }
                }
            }
        }
        Ok(result)
    }
}

fn build_container_index(
    container_rows: &[QueryRow],
    model_rows: &[QueryRow],
) -> TreeResult<ContainerIndex> {
    let mut index = ContainerIndex::default();
    let mut target_overrides: Vec<(ContainerId, ModelId)> = Vec::new();

    for row in container_rows {
        let id = ContainerId(row.i64("id")?);
        match row.opt_i64("parent_id")? {
            Some(parent) => {
                index.parent_of.insert(id, ContainerId(parent));
                index
                    .child_containers
                    .entry(ContainerId(parent))
                    .or_default()
                    .push(id);
            }
            None => index.roots.push(id),
        }
        if row.bool("hidden_in_hierarchy")? {
            index.hidden.insert(id);
        }
        if let Some(target) = row
            .opt_str("json_properties")?
            .and_then(|json| parse_target_override(id, json))
        {
            target_overrides.push((id, target));
        }
    }

    for row in model_rows {
        let id = ModelId(row.i64("id")?);
        let owner = row.opt_i64("owner_container_id")?.map(ContainerId);
        let modeled_element_id = row.opt_i64("modeled_element_id")?.map(ElementId);
        if let Some(element) = modeled_element_id {
            index.sub_models.insert(element, id);
        }
        if let Some(owner) = owner {
            index.container_models.entry(owner).or_default().push(id);
        }
        index.models.insert(
            id,
            ModelInfo {
                owners: owner.into_iter().collect(),
                hidden_in_hierarchy: row.bool("hidden_in_hierarchy")?,
                modeled_element_id,
            },
        );
    }

    // Reverse index of target-override pointers: the claiming container owns
    // the model as if its partition were defined there.
    for (container, model) in target_overrides {
        let Some(info) = index.models.get_mut(&model) else {
            continue;
        };
        if !info.owners.contains(&container) {
            info.owners.push(container);
            index.container_models.entry(container).or_default().push(model);
        }
    }

    index.roots.sort();
    for children in index.child_containers.values_mut() {
        children.sort();
    }
    for models in index.container_models.values_mut() {
        models.sort();
        models.dedup();
    }
    for info in index.models.values_mut() {
        info.owners.sort();
    }
    index.parent_container_ids = compute_parent_container_ids(&index);
    Ok(index)
}

/// Bottom-up walk marking every container whose subtree owns a model.
fn compute_parent_container_ids(index: &ContainerIndex) -> HashSet<ContainerId> {
    let mut result = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(ContainerId, bool)> = index.roots.iter().map(|id| (*id, false)).collect();

    while let Some((id, children_done)) = stack.pop() {
        if children_done {
            let owns_model = !index.models_of(id).is_empty();
            if owns_model || index.children(id).iter().any(|c| result.contains(c)) {
                result.insert(id);
            }
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        stack.extend(index.children(id).iter().map(|child| (*child, false)));
    }
    result
}
