//! Tree levels of the containment graph.
//!
//! Containers nest through `parent_id`; hidden containers are skipped and
//! their children spliced into the nearest visible ancestor. Containers list
//! their models; hidden models list their categories in their place. Models
//! list the categories of their root elements, categories list those root
//! elements, and elements list their child elements plus the categories of
//! their sub-model.

use crate::cache::GraphIndexCache;
use crate::cancellation::LatestRequest;
use crate::config::TreeConfig;
use crate::error::TreeResult;
use assettree_core::{
    CategoryId, ContainerId, ElementId, EntityKind, ModelId, NodeContext, NodeKey, TreeNode,
};
use assettree_storage::{QueryRow, StructuralQuery, placeholders};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

mod paths;
mod search;

const HIERARCHY_TARGET: &str = "assettree::visibility::hierarchy";

const ELEMENT_SELECT: &str = "SELECT e.id, e.label, e.class_name, e.model_id, e.category_id,
        CASE WHEN EXISTS (SELECT 1 FROM element child WHERE child.parent_id = e.id)
              OR EXISTS (SELECT 1 FROM model sm
                         WHERE sm.modeled_element_id = e.id AND sm.is_private = 0
                         AND EXISTS (SELECT 1 FROM element se WHERE se.model_id = sm.id))
             THEN 1 ELSE 0 END AS has_children,
        (SELECT sm.id FROM model sm WHERE sm.modeled_element_id = e.id AND sm.is_private = 0
           AND EXISTS (SELECT 1 FROM element se WHERE se.model_id = sm.id)
         ORDER BY sm.id LIMIT 1) AS sub_model_id
     FROM element e";

/// How rows of a child query become tree nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayMetadata {
    /// Rows sharing a label collapse into one node carrying every id.
    pub merge_by_label: bool,
    /// Element rows collapse into one node per (model, category, class).
    pub group_by_class: bool,
}

/// One structural query enumerating children of a node.
#[derive(Debug, Clone)]
pub struct ChildQueryDefinition {
    pub entity: EntityKind,
    pub query: StructuralQuery,
    pub display: DisplayMetadata,
}

/// Where the element rows of a level come from.
enum ElementScope<'a> {
    CategoryRoots {
        model_ids: &'a [ModelId],
        category_ids: &'a [CategoryId],
    },
    Children(ElementId),
    Ids(&'a [ElementId]),
}

#[derive(Clone)]
pub struct HierarchyDefinition {
    cache: Arc<GraphIndexCache>,
    config: TreeConfig,
    searches: LatestRequest,
}

impl HierarchyDefinition {
    pub fn new(cache: Arc<GraphIndexCache>, config: TreeConfig) -> Self {
        Self {
            cache,
            config,
            searches: LatestRequest::new(),
        }
    }

    pub fn cache(&self) -> &Arc<GraphIndexCache> {
        &self.cache
    }

    /// Child queries of `parent`, or of the tree root when `parent` is `None`.
    ///
    /// # Panics
    ///
    /// Panics when `parent` is a category node without model context.
    pub async fn define_children(
        &self,
        parent: Option<&TreeNode>,
    ) -> TreeResult<Vec<ChildQueryDefinition>> {
        let Some(parent) = parent else {
            return self.root_definitions().await;
        };

        match &parent.key {
            NodeKey::Containers(ids) => self.container_level_definitions(ids, Vec::new()).await,
            NodeKey::Model(model_id) => Ok(vec![category_definition(&[*model_id])]),
            NodeKey::Categories(category_ids) => {
                assert!(
                    !parent.context.model_ids.is_empty(),
                    "category node {category_ids:?} has no model context"
                );
                Ok(vec![self.element_definition(
                    ElementScope::CategoryRoots {
                        model_ids: &parent.context.model_ids,
                        category_ids,
                    },
                    self.config.group_elements_by_class,
                )])
            }
            NodeKey::Element(element_id) => {
                let mut definitions = vec![self.element_definition(
                    ElementScope::Children(*element_id),
                    self.config.group_elements_by_class,
                )];
                let sub_model = match parent.context.sub_model_id {
                    Some(sub_model) => Some(sub_model),
                    None => self.cache.get_element_sub_model(*element_id).await?,
                };
                if let Some(sub_model) = sub_model {
                    definitions.push(category_definition(&[sub_model]));
                }
                Ok(definitions)
            }
            NodeKey::ClassGrouping { element_ids, .. } => {
                Ok(vec![self.element_definition(ElementScope::Ids(element_ids), false)])
            }
        }
    }

    /// Runs the child queries of `parent` and builds its child nodes.
    pub async fn children_of(&self, parent: Option<&TreeNode>) -> TreeResult<Vec<TreeNode>> {
        let definitions = self.define_children(parent).await?;
        let mut nodes = Vec::new();
        for definition in definitions {
            let rows = self.cache.store().query(&definition.query).await?;
            let level = match definition.entity {
                EntityKind::Container => container_nodes(&rows, definition.display)?,
                EntityKind::Model => model_nodes(&rows)?,
                EntityKind::Category => category_nodes(&rows, definition.display)?,
                EntityKind::Element => element_nodes(&rows, definition.display)?,
            };
            nodes.extend(level);
        }
        debug!(
            target: HIERARCHY_TARGET,
            parent = ?parent.map(|node| &node.key),
            children = nodes.len(),
            "children resolved"
        );
        Ok(nodes)
    }

    async fn root_definitions(&self) -> TreeResult<Vec<ChildQueryDefinition>> {
        let parents = self.cache.get_parent_container_ids().await?;
        let mut visible_roots = Vec::new();
        let mut hidden_roots = Vec::new();
        for root in self.cache.get_root_container_ids().await? {
            if self.cache.is_hidden_container(root).await? {
                hidden_roots.push(root);
            } else if parents.contains(&root) {
                visible_roots.push(root);
            }
        }
        self.container_level_definitions(&hidden_roots, visible_roots)
            .await
    }

    /// Children of the (merged) containers `ids`: nearest visible child
    /// containers owning models, models owned directly or through hidden
    /// containers, and categories of hidden models.
    async fn container_level_definitions(
        &self,
        ids: &[ContainerId],
        mut containers: Vec<ContainerId>,
    ) -> TreeResult<Vec<ChildQueryDefinition>> {
        let parents = self.cache.get_parent_container_ids().await?;
        containers.extend(
            self.cache
                .get_child_container_ids(ids)
                .await?
                .into_iter()
                .filter(|id| parents.contains(id)),
        );

        let mut models = Vec::new();
        let mut spliced_models = Vec::new();
        for model_id in self.cache.get_container_model_ids(ids).await? {
            match self.cache.get_model_info(model_id).await? {
                Some(info) if info.hidden_in_hierarchy => spliced_models.push(model_id),
                Some(_) => models.push(model_id),
                None => {}
            }
        }

        let mut definitions = Vec::new();
        if !containers.is_empty() {
            definitions.push(container_definition(&containers));
        }
        if !models.is_empty() {
            definitions.push(model_definition(&models));
        }
        if !spliced_models.is_empty() {
            definitions.push(category_definition(&spliced_models));
        }
        Ok(definitions)
    }

    fn element_definition(
        &self,
        scope: ElementScope<'_>,
        group_by_class: bool,
    ) -> ChildQueryDefinition {
        let query = match scope {
            ElementScope::CategoryRoots {
                model_ids,
                category_ids,
            } => StructuralQuery::new(
                "category_elements",
                format!(
                    "{ELEMENT_SELECT}
                     WHERE e.parent_id IS NULL AND e.model_id IN ({}) AND e.category_id IN ({})
                     ORDER BY e.label, e.id",
                    placeholders(model_ids.len()),
                    placeholders(category_ids.len())
                ),
            )
            .bind_all(model_ids.iter().map(|id| id.0))
            .bind_all(category_ids.iter().map(|id| id.0)),
            ElementScope::Children(parent_id) => StructuralQuery::new(
                "child_elements",
                format!("{ELEMENT_SELECT} WHERE e.parent_id = ? ORDER BY e.label, e.id"),
            )
            .bind(parent_id.0),
            ElementScope::Ids(element_ids) => StructuralQuery::new(
                "grouped_elements",
                format!(
                    "{ELEMENT_SELECT} WHERE e.id IN ({}) ORDER BY e.label, e.id",
                    placeholders(element_ids.len())
                ),
            )
            .bind_all(element_ids.iter().map(|id| id.0)),
        };
        ChildQueryDefinition {
            entity: EntityKind::Element,
            query,
            display: DisplayMetadata {
                merge_by_label: false,
                group_by_class,
            },
        }
    }
}

fn container_definition(ids: &[ContainerId]) -> ChildQueryDefinition {
    let sql = format!(
        "SELECT c.id, c.label, 1 AS has_children FROM container c
         WHERE c.id IN ({})
         ORDER BY c.label, c.id",
        placeholders(ids.len())
    );
    ChildQueryDefinition {
        entity: EntityKind::Container,
        query: StructuralQuery::new("child_containers", sql).bind_all(ids.iter().map(|id| id.0)),
        display: DisplayMetadata {
            merge_by_label: true,
            group_by_class: false,
        },
    }
}

fn model_definition(ids: &[ModelId]) -> ChildQueryDefinition {
    let sql = format!(
        "SELECT m.id, m.label, 1 AS has_children FROM model m
         WHERE m.id IN ({})
         ORDER BY m.label, m.id",
        placeholders(ids.len())
    );
    ChildQueryDefinition {
        entity: EntityKind::Model,
        query: StructuralQuery::new("container_models", sql).bind_all(ids.iter().map(|id| id.0)),
        display: DisplayMetadata::default(),
    }
}

fn category_definition(model_ids: &[ModelId]) -> ChildQueryDefinition {
    let sql = format!(
        "SELECT c.id, c.label, e.model_id, 1 AS has_children
         FROM element e JOIN category c ON c.id = e.category_id
         WHERE e.parent_id IS NULL AND e.model_id IN ({})
         GROUP BY c.id, e.model_id
         ORDER BY c.label, c.id, e.model_id",
        placeholders(model_ids.len())
    );
    ChildQueryDefinition {
        entity: EntityKind::Category,
        query: StructuralQuery::new("model_categories_level", sql)
            .bind_all(model_ids.iter().map(|id| id.0)),
        display: DisplayMetadata {
            merge_by_label: true,
            group_by_class: false,
        },
    }
}

/// Collects rows into label buckets in first-seen order.
struct LabelBuckets<T> {
    order: Vec<(String, Vec<T>)>,
    positions: HashMap<String, usize>,
}

impl<T> LabelBuckets<T> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn push(&mut self, label: &str, merge: bool, item: T) {
        if merge {
            if let Some(position) = self.positions.get(label) {
                self.order[*position].1.push(item);
                return;
            }
            self.positions.insert(label.to_string(), self.order.len());
        }
        self.order.push((label.to_string(), vec![item]));
    }
}

fn container_nodes(rows: &[QueryRow], display: DisplayMetadata) -> TreeResult<Vec<TreeNode>> {
    let mut buckets = LabelBuckets::new();
    for row in rows {
        let id = ContainerId(row.i64("id")?);
        let has_children = row.bool("has_children")?;
        buckets.push(row.str("label")?, display.merge_by_label, (id, has_children));
    }
    Ok(buckets
        .order
        .into_iter()
        .map(|(label, entries)| {
            let has_children = entries.iter().any(|(_, has_children)| *has_children);
            let ids = entries.into_iter().map(|(id, _)| id).collect();
            TreeNode::new(NodeKey::Containers(ids), label).with_children(has_children)
        })
        .collect())
}

fn model_nodes(rows: &[QueryRow]) -> TreeResult<Vec<TreeNode>> {
    rows.iter()
        .map(|row| -> TreeResult<TreeNode> {
            let id = ModelId(row.i64("id")?);
            Ok(TreeNode::new(NodeKey::Model(id), row.str("label")?)
                .with_children(row.bool("has_children")?)
                .with_context(NodeContext {
                    model_ids: vec![id],
                    ..NodeContext::default()
                }))
        })
        .collect()
}

fn category_nodes(rows: &[QueryRow], display: DisplayMetadata) -> TreeResult<Vec<TreeNode>> {
    let mut buckets = LabelBuckets::new();
    for row in rows {
        let id = CategoryId(row.i64("id")?);
        let model_id = ModelId(row.i64("model_id")?);
        buckets.push(row.str("label")?, display.merge_by_label, (id, model_id));
    }
    Ok(buckets
        .order
        .into_iter()
        .map(|(label, entries)| {
            let mut category_ids: Vec<CategoryId> = entries.iter().map(|(id, _)| *id).collect();
            let mut model_ids: Vec<ModelId> = entries.iter().map(|(_, model)| *model).collect();
            category_ids.sort();
            category_ids.dedup();
            model_ids.sort();
            model_ids.dedup();
            TreeNode::new(NodeKey::Categories(category_ids), label)
                .with_children(true)
                .with_context(NodeContext {
                    model_ids,
                    ..NodeContext::default()
                })
        })
        .collect())
}

fn element_nodes(rows: &[QueryRow], display: DisplayMetadata) -> TreeResult<Vec<TreeNode>> {
    if !display.group_by_class {
        return rows
            .iter()
            .map(|row| -> TreeResult<TreeNode> {
                let model_id = ModelId(row.i64("model_id")?);
                Ok(
                    TreeNode::new(NodeKey::Element(ElementId(row.i64("id")?)), row.str("label")?)
                        .with_children(row.bool("has_children")?)
                        .with_context(NodeContext {
                            model_ids: vec![model_id],
                            category_id: Some(CategoryId(row.i64("category_id")?)),
                            sub_model_id: row.opt_i64("sub_model_id")?.map(ModelId),
                        }),
                )
            })
            .collect();
    }

    let mut groups: BTreeMap<(String, ModelId, CategoryId), Vec<ElementId>> = BTreeMap::new();
    for row in rows {
        let key = (
            row.str("class_name")?.to_string(),
            ModelId(row.i64("model_id")?),
            CategoryId(row.i64("category_id")?),
        );
        groups
            .entry(key)
            .or_default()
            .push(ElementId(row.i64("id")?));
    }
    Ok(groups
        .into_iter()
        .map(|((class_name, model_id, category_id), element_ids)| {
            TreeNode::new(
                NodeKey::ClassGrouping {
                    class_name: class_name.clone(),
                    element_ids,
                },
                class_name,
            )
            .with_children(true)
            .with_context(NodeContext {
                model_ids: vec![model_id],
                category_id: Some(category_id),
                sub_model_id: None,
            })
        })
        .collect())
}
