//! Hierarchy and visibility resolution over a containment graph of
//! containers, models, categories and elements.
//!
//! [`GraphIndexCache`] memoizes the structural indices, [`HierarchyDefinition`]
//! turns them into tree levels and paths, and [`VisibilityResolver`] derives a
//! tri-state display status for every node from the override records held by a
//! [`RenderingSurface`].

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod session;
pub mod surface;
pub mod visibility;

pub use cache::{GraphIndexCache, ModelInfo};
pub use cancellation::{LatestRequest, RequestToken};
pub use config::TreeConfig;
pub use error::{TreeError, TreeResult};
pub use hierarchy::{ChildQueryDefinition, DisplayMetadata, HierarchyDefinition};
pub use session::TreeSession;
pub use surface::{InMemorySurface, RenderingSurface};
pub use visibility::overrides::{
    CategoryProps, ChangeFuture, ChangeOverride, ContainerProps, DefaultChange, DefaultStatus,
    ElementProps, GroupingProps, ModelProps, StatusFuture, StatusOverride, VisibilityOverrides,
};
pub use visibility::VisibilityResolver;
