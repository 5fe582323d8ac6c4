use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod hierarchy;
pub mod status;

pub use hierarchy::{HierarchyPath, NodeContext, NodeKey, TreeNode};
pub use status::{CategoryOverride, VisibilityStatus};

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(ContainerId);
entity_id!(ModelId);
entity_id!(CategoryId);
entity_id!(ElementId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EntityKind {
    Container,
    Model,
    Category,
    Element,
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone)]
pub enum EnumConversionError {
    #[error("Invalid EntityKind value: {0}")]
    InvalidEntityKind(i32),
    #[error("Invalid CategoryOverride value: {0}")]
    InvalidCategoryOverride(i32),
}

impl TryFrom<i32> for EntityKind {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntityKind::Container),
            1 => Ok(EntityKind::Model),
            2 => Ok(EntityKind::Category),
            3 => Ok(EntityKind::Element),
            _ => Err(EnumConversionError::InvalidEntityKind(value)),
        }
    }
}

/// A typed reference to one entity of the containment graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceKey {
    Container(ContainerId),
    Model(ModelId),
    Category(CategoryId),
    Element(ElementId),
}

impl InstanceKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            InstanceKey::Container(_) => EntityKind::Container,
            InstanceKey::Model(_) => EntityKind::Model,
            InstanceKey::Category(_) => EntityKind::Category,
            InstanceKey::Element(_) => EntityKind::Element,
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            InstanceKey::Container(id) => id.0,
            InstanceKey::Model(id) => id.0,
            InstanceKey::Category(id) => id.0,
            InstanceKey::Element(id) => id.0,
        }
    }

    pub fn from_raw(kind: EntityKind, id: i64) -> Self {
        match kind {
            EntityKind::Container => InstanceKey::Container(ContainerId(id)),
            EntityKind::Model => InstanceKey::Model(ModelId(id)),
            EntityKind::Category => InstanceKey::Category(CategoryId(id)),
            EntityKind::Element => InstanceKey::Element(ElementId(id)),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Container(id) => write!(f, "container:{id}"),
            InstanceKey::Model(id) => write!(f, "model:{id}"),
            InstanceKey::Category(id) => write!(f, "category:{id}"),
            InstanceKey::Element(id) => write!(f, "element:{id}"),
        }
    }
}

// ============================================================================
// Containment graph records
// ============================================================================

/// Organizational node. Hidden containers are skipped in the tree and lend
/// their children to the nearest visible ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub parent_id: Option<ContainerId>,
    pub label: String,
    pub hidden_in_hierarchy: bool,
    /// Raw JSON properties; may carry a target-override pointer to a model
    /// defined elsewhere.
    pub json_properties: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub label: String,
    /// Container owning the model's partition. `None` for sub-models.
    pub owner_container_id: Option<ContainerId>,
    /// Set when the model is the sub-model of an element.
    pub modeled_element_id: Option<ElementId>,
    pub is_private: bool,
    pub hidden_in_hierarchy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub model_id: ModelId,
    pub category_id: CategoryId,
    pub parent_id: Option<ElementId>,
    pub label: String,
    pub class_name: String,
}
