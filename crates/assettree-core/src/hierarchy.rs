use crate::{CategoryId, ContainerId, ElementId, InstanceKey, ModelId};
use serde::{Deserialize, Serialize};

/// Root-to-target chain of instance keys.
pub type HierarchyPath = Vec<InstanceKey>;

/// Identity of a tree node. Containers and categories that share a label at
/// one level are merged into a single node carrying every id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Containers(Vec<ContainerId>),
    Model(ModelId),
    Categories(Vec<CategoryId>),
    Element(ElementId),
    /// Synthetic node grouping sibling elements of one class.
    ClassGrouping {
        class_name: String,
        element_ids: Vec<ElementId>,
    },
}

/// Metadata a node carries for its own expansion and visibility resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeContext {
    /// Owning models of category, element and grouping nodes.
    pub model_ids: Vec<ModelId>,
    /// Category of element and grouping nodes.
    pub category_id: Option<CategoryId>,
    /// Sub-model of an element node, if it has a displayable one.
    pub sub_model_id: Option<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub key: NodeKey,
    pub label: String,
    pub has_children: bool,
    pub context: NodeContext,
}

impl TreeNode {
    pub fn new(key: NodeKey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
            has_children: false,
            context: NodeContext::default(),
        }
    }

    pub fn with_children(mut self, has_children: bool) -> Self {
        self.has_children = has_children;
        self
    }

    pub fn with_context(mut self, context: NodeContext) -> Self {
        self.context = context;
        self
    }
}
