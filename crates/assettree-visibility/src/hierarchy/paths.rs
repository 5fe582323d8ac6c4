use super::HierarchyDefinition;
use crate::error::{TreeError, TreeResult};
use assettree_core::{CategoryId, ContainerId, ElementId, HierarchyPath, InstanceKey, ModelId};
use assettree_events::telemetry::{
    OP_FIND_PATHS, new_correlation_id, operation_failure, operation_start, operation_success,
};
use assettree_storage::{StructuralQuery, placeholders};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tracing::warn;

type PathsFuture<'a, T> = Pin<Box<dyn Future<Output = TreeResult<T>> + Send + 'a>>;

/// Sub-model chains nest through modeled elements; deeper nesting is treated
/// as corrupt data.
const MAX_SUB_MODEL_DEPTH: usize = 16;

const MAX_TARGETS_PER_QUERY: usize = 900;

/// Walks every target element up to its root element, accumulating the
/// visited ids as `target,parent,...,root`.
fn element_paths_sql(target_count: usize) -> String {
    format!(
        "WITH RECURSIVE walk(target_id, id, parent_id, model_id, category_id, path) AS (
             SELECT e.id, e.id, e.parent_id, e.model_id, e.category_id, CAST(e.id AS TEXT)
             FROM element e WHERE e.id IN ({})
             UNION ALL
             SELECT w.target_id, p.id, p.parent_id, p.model_id, p.category_id, w.path || ',' || p.id
             FROM walk w JOIN element p ON p.id = w.parent_id
             WHERE instr(',' || w.path || ',', ',' || p.id || ',') = 0
         )
         SELECT target_id, model_id, category_id, path FROM walk
         WHERE parent_id IS NULL
         ORDER BY target_id",
        placeholders(target_count)
    )
}

fn parse_element_chain(path: &str) -> TreeResult<Vec<ElementId>> {
    let mut chain = path
        .split(',')
        .map(|id| {
            id.trim()
                .parse::<i64>()
                .map(ElementId)
                .map_err(|_| TreeError::MalformedRow(format!("element path {path:?}")))
        })
        .collect::<TreeResult<Vec<_>>>()?;
    chain.reverse();
    Ok(chain)
}

impl HierarchyDefinition {
    /// Root-to-target key chains for every target that appears in the tree.
    ///
    /// Hidden containers and hidden models have no node of their own and
    /// yield no path; a model claimed by several containers yields one path
    /// per container.
    pub async fn find_paths_to_targets(
        &self,
        targets: &[InstanceKey],
    ) -> TreeResult<Vec<HierarchyPath>> {
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        operation_start(
            OP_FIND_PATHS,
            &correlation_id,
            &format!("{} targets", targets.len()),
        );

        match self.collect_paths(targets).await {
            Ok(paths) => {
                operation_success(
                    OP_FIND_PATHS,
                    &correlation_id,
                    Some(started.elapsed().as_millis()),
                );
                Ok(paths)
            }
            Err(err) => {
                operation_failure(OP_FIND_PATHS, &correlation_id, Some(err.to_string()));
                Err(err)
            }
        }
    }

    pub(super) async fn collect_paths(
        &self,
        targets: &[InstanceKey],
    ) -> TreeResult<Vec<HierarchyPath>> {
        let element_targets: Vec<ElementId> = targets
            .iter()
            .filter_map(|target| match target {
                InstanceKey::Element(id) => Some(*id),
                _ => None,
            })
            .collect();
        let mut element_paths = if element_targets.is_empty() {
            HashMap::new()
        } else {
            self.element_paths(&element_targets, 0).await?
        };

        let mut paths = Vec::new();
        let mut seen = HashSet::new();
        for target in targets {
            let found = match *target {
                InstanceKey::Container(id) => self.container_path(id).await?.into_iter().collect(),
                InstanceKey::Model(id) => self.model_target_paths(id).await?,
                InstanceKey::Category(id) => self.category_target_paths(id).await?,
                InstanceKey::Element(id) => element_paths.remove(&id).unwrap_or_default(),
            };
            for path in found {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }

    async fn container_path(&self, id: ContainerId) -> TreeResult<Option<HierarchyPath>> {
        if self.cache.is_hidden_container(id).await?
            || !self.cache.get_parent_container_ids().await?.contains(&id)
        {
            return Ok(None);
        }
        let chain = self.cache.get_container_chain(id).await?;
        Ok(Some(chain.into_iter().map(InstanceKey::Container).collect()))
    }

    async fn model_target_paths(&self, id: ModelId) -> TreeResult<Vec<HierarchyPath>> {
        match self.cache.get_model_info(id).await? {
            Some(info) if !info.hidden_in_hierarchy && info.modeled_element_id.is_none() => {
                self.model_chains(id, 0).await
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn category_target_paths(&self, id: CategoryId) -> TreeResult<Vec<HierarchyPath>> {
        let mut paths = Vec::new();
        for model_id in self.cache.get_category_models(id).await? {
            for mut chain in self.model_chains(model_id, 0).await? {
                chain.push(InstanceKey::Category(id));
                paths.push(chain);
            }
        }
        Ok(paths)
    }

    /// Chains leading to the children of `model_id`: the owning container
    /// chains (or the modeled element's path for a sub-model) followed by the
    /// model itself unless the model is spliced away.
    fn model_chains(&self, model_id: ModelId, depth: usize) -> PathsFuture<'_, Vec<HierarchyPath>> {
        Box::pin(async move {
            let Some(info) = self.cache.get_model_info(model_id).await? else {
                return Ok(Vec::new());
            };

            if let Some(element_id) = info.modeled_element_id {
                if depth >= MAX_SUB_MODEL_DEPTH {
                    warn!(
                        target: super::HIERARCHY_TARGET,
                        model = %model_id,
                        "sub-model nesting too deep, skipping"
                    );
                    return Ok(Vec::new());
                }
                let mut found = self.element_paths(&[element_id], depth + 1).await?;
                return Ok(found.remove(&element_id).unwrap_or_default());
            }

            let mut chains = Vec::with_capacity(info.owners.len());
            for owner in &info.owners {
                let mut chain: HierarchyPath = self
                    .cache
                    .get_container_chain(*owner)
                    .await?
                    .into_iter()
                    .map(InstanceKey::Container)
                    .collect();
                if !info.hidden_in_hierarchy {
                    chain.push(InstanceKey::Model(model_id));
                }
                chains.push(chain);
            }
            Ok(chains)
        })
    }

    /// Paths of element targets: one recursive query walks every target up
    /// to its root element; the reversed fragment gets the root's category
    /// and is prefixed with the model chains.
    fn element_paths<'a>(
        &'a self,
        targets: &'a [ElementId],
        depth: usize,
    ) -> PathsFuture<'a, HashMap<ElementId, Vec<HierarchyPath>>> {
        Box::pin(async move {
            let mut fragments: Vec<(ElementId, ModelId, CategoryId, Vec<ElementId>)> = Vec::new();
            for chunk in targets.chunks(MAX_TARGETS_PER_QUERY) {
                let query = StructuralQuery::new("element_paths", element_paths_sql(chunk.len()))
                    .bind_all(chunk.iter().map(|id| id.0));
                for row in self.cache.store().query(&query).await? {
                    fragments.push((
                        ElementId(row.i64("target_id")?),
                        ModelId(row.i64("model_id")?),
                        CategoryId(row.i64("category_id")?),
                        parse_element_chain(row.str("path")?)?,
                    ));
                }
            }

            let mut model_chains: HashMap<ModelId, Vec<HierarchyPath>> = HashMap::new();
            let mut result: HashMap<ElementId, Vec<HierarchyPath>> = HashMap::new();
            for (target, model_id, category_id, elements) in fragments {
                if !model_chains.contains_key(&model_id) {
                    let chains = self.model_chains(model_id, depth).await?;
                    model_chains.insert(model_id, chains);
                }
                let Some(chains) = model_chains.get(&model_id) else {
                    continue;
                };
                let paths = result.entry(target).or_default();
                for chain in chains {
                    let mut path = chain.clone();
                    path.push(InstanceKey::Category(category_id));
                    path.extend(elements.iter().copied().map(InstanceKey::Element));
                    paths.push(path);
                }
            }
            Ok(result)
        })
    }
}
