#![allow(dead_code)]

use assettree_core::{
    Category, CategoryId, Container, ContainerId, Element, ElementId, Model, ModelId,
};
use assettree_storage::{BackingStore, QueryRow, Storage, StorageError, StructuralQuery};
use assettree_visibility::{InMemorySurface, TreeConfig, TreeSession, VisibilityOverrides};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Builds a small dataset in an in-memory store.
#[derive(Default)]
pub struct DatasetBuilder {
    containers: Vec<Container>,
    models: Vec<Model>,
    categories: Vec<Category>,
    elements: Vec<Element>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(mut self, id: i64, parent: Option<i64>, label: &str) -> Self {
        self.containers.push(Container {
            id: ContainerId(id),
            parent_id: parent.map(ContainerId),
            label: label.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn hidden_container(mut self, id: i64, parent: Option<i64>, label: &str) -> Self {
        self.containers.push(Container {
            id: ContainerId(id),
            parent_id: parent.map(ContainerId),
            label: label.to_string(),
            hidden_in_hierarchy: true,
            ..Default::default()
        });
        self
    }

    /// A container claiming `model` through its json properties.
    pub fn claiming_container(
        mut self,
        id: i64,
        parent: Option<i64>,
        label: &str,
        model: i64,
    ) -> Self {
        self.containers.push(Container {
            id: ContainerId(id),
            parent_id: parent.map(ContainerId),
            label: label.to_string(),
            json_properties: Some(format!(
                r#"{{"subject":{{"model":{{"targetPartition":{model}}}}}}}"#
            )),
            ..Default::default()
        });
        self
    }

    pub fn model(mut self, id: i64, owner: i64, label: &str) -> Self {
        self.models.push(Model {
            id: ModelId(id),
            label: label.to_string(),
            owner_container_id: Some(ContainerId(owner)),
            ..Default::default()
        });
        self
    }

    pub fn hidden_model(mut self, id: i64, owner: i64, label: &str) -> Self {
        self.models.push(Model {
            id: ModelId(id),
            label: label.to_string(),
            owner_container_id: Some(ContainerId(owner)),
            hidden_in_hierarchy: true,
            ..Default::default()
        });
        self
    }

    pub fn private_model(mut self, id: i64, owner: i64, label: &str) -> Self {
        self.models.push(Model {
            id: ModelId(id),
            label: label.to_string(),
            owner_container_id: Some(ContainerId(owner)),
            is_private: true,
            ..Default::default()
        });
        self
    }

    pub fn sub_model(mut self, id: i64, modeled_element: i64, label: &str) -> Self {
        self.models.push(Model {
            id: ModelId(id),
            label: label.to_string(),
            modeled_element_id: Some(ElementId(modeled_element)),
            ..Default::default()
        });
        self
    }

    pub fn category(mut self, id: i64, label: &str) -> Self {
        self.categories.push(Category {
            id: CategoryId(id),
            label: label.to_string(),
        });
        self
    }

    pub fn element(
        mut self,
        id: i64,
        model: i64,
        category: i64,
        parent: Option<i64>,
        label: &str,
    ) -> Self {
        self.elements.push(Element {
            id: ElementId(id),
            model_id: ModelId(model),
            category_id: CategoryId(category),
            parent_id: parent.map(ElementId),
            label: label.to_string(),
            class_name: "Element".to_string(),
        });
        self
    }

    pub fn element_of_class(
        mut self,
        id: i64,
        model: i64,
        category: i64,
        parent: Option<i64>,
        label: &str,
        class_name: &str,
    ) -> Self {
        self.elements.push(Element {
            id: ElementId(id),
            model_id: ModelId(model),
            category_id: CategoryId(category),
            parent_id: parent.map(ElementId),
            label: label.to_string(),
            class_name: class_name.to_string(),
        });
        self
    }

    pub fn build(self) -> Result<Arc<Storage>, StorageError> {
        let storage = Storage::new_in_memory()?;
        storage.insert_containers_batch(&self.containers)?;
        storage.insert_models_batch(&self.models)?;
        storage.insert_categories_batch(&self.categories)?;
        storage.insert_elements_batch(&self.elements)?;
        Ok(Arc::new(storage))
    }
}

/// Store wrapper that yields before every query and counts queries by name.
pub struct CountingStore {
    inner: Arc<Storage>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CountingStore {
    pub fn new(inner: Arc<Storage>) -> Self {
        Self {
            inner,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

#[async_trait]
impl BackingStore for CountingStore {
    async fn query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError> {
        *self.counts.lock().entry(query.name).or_insert(0) += 1;
        tokio::task::yield_now().await;
        self.inner.query(query).await
    }
}

/// Store wrapper failing the `fail_on`-th query named `query_name`; every
/// other query goes through.
pub struct FailingStore {
    inner: Arc<Storage>,
    query_name: &'static str,
    fail_on: usize,
    seen: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<Storage>, query_name: &'static str, fail_on: usize) -> Self {
        Self {
            inner,
            query_name,
            fail_on,
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BackingStore for FailingStore {
    async fn query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError> {
        if query.name == self.query_name
            && self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on
        {
            return Err(StorageError::Other("backing store went away".to_string()));
        }
        self.inner.query(query).await
    }
}

/// The scene used across the visibility tests:
///
/// ```text
/// Root (1)
/// ├── Site (2) ── Model M (10)
/// │               ├── Walls (100): E1 (1000) ─ E1a (1003), E2 (1001)
/// │               └── Doors (101): E3 (1002)
/// └── Hidden (3, hidden) ── Model M2 (20)
///                            └── Walls (102): E4 (2000)
///     └── Annex (4) ── Model M3 (30)
///                       └── Doors (101): E5 (3000)
/// ```
pub fn scene() -> Result<Arc<Storage>, StorageError> {
    DatasetBuilder::new()
        .container(1, None, "Root")
        .container(2, Some(1), "Site")
        .hidden_container(3, Some(1), "Hidden")
        .container(4, Some(3), "Annex")
        .model(10, 2, "Model M")
        .model(20, 3, "Model M2")
        .model(30, 4, "Model M3")
        .category(100, "Walls")
        .category(101, "Doors")
        .category(102, "Walls")
        .element(1000, 10, 100, None, "E1")
        .element(1001, 10, 100, None, "E2")
        .element(1002, 10, 101, None, "E3")
        .element(1003, 10, 100, Some(1000), "E1a")
        .element(2000, 20, 102, None, "E4")
        .element(3000, 30, 101, None, "E5")
        .build()
}

pub fn session_with(
    store: Arc<dyn BackingStore>,
    surface: Arc<InMemorySurface>,
    config: TreeConfig,
    overrides: VisibilityOverrides,
) -> TreeSession {
    TreeSession::new(store, surface, config, overrides)
}

pub fn ungrouped() -> TreeConfig {
    TreeConfig {
        group_elements_by_class: false,
        ..TreeConfig::default()
    }
}
