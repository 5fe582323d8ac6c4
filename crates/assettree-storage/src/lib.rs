use assettree_core::{
    Category, CategoryId, Container, ContainerId, Element, ElementId, EnumConversionError, Model,
    ModelId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod query;
mod row_mapping;
mod schema;

pub use query::{BackingStore, QueryRow, QueryValue, StructuralQuery, placeholders};

const SCHEMA_VERSION: u32 = 1;
const QUERY_TARGET: &str = "assettree::storage::query";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid enum value: {0}")]
    EnumConversion(#[from] EnumConversionError),
    #[error("Missing column in query result: {0}")]
    MissingColumn(String),
    #[error("Unexpected value in column {column}: expected {expected}")]
    UnexpectedValue {
        column: String,
        expected: &'static str,
    },
    #[error("Other error: {0}")]
    Other(String),
}

/// SQLite-backed containment graph. Implements [`BackingStore`].
pub struct Storage {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub container_count: i64,
    pub model_count: i64,
    pub category_count: i64,
    pub element_count: i64,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        // Tree sessions read while importers write; avoid flaky "database is locked" errors.
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init()?;
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init()?;
        Ok(storage)
    }

    fn init(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        schema::create_tables(&conn)?;
        schema::create_indexes(&conn)?;
        schema::check_schema_version(&conn)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM element", [])?;
        tx.execute("DELETE FROM category", [])?;
        tx.execute("DELETE FROM model", [])?;
        tx.execute("DELETE FROM container", [])?;
        tx.commit()?;
        Ok(())
    }

    // Batch operations
    pub fn insert_containers_batch(&self, containers: &[Container]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO container (id, parent_id, label, hidden_in_hierarchy, json_properties)
                 VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(id) DO NOTHING",
            )?;
            for container in containers {
                stmt.execute(params![
                    container.id.0,
                    container.parent_id.map(|id| id.0),
                    container.label,
                    container.hidden_in_hierarchy,
                    container.json_properties,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_models_batch(&self, models: &[Model]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO model
                     (id, label, owner_container_id, modeled_element_id,
                      is_private, hidden_in_hierarchy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(id) DO NOTHING",
            )?;
            for model in models {
                stmt.execute(params![
                    model.id.0,
                    model.label,
                    model.owner_container_id.map(|id| id.0),
                    model.modeled_element_id.map(|id| id.0),
                    model.is_private,
                    model.hidden_in_hierarchy,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_categories_batch(&self, categories: &[Category]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO category (id, label) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
            )?;
            for category in categories {
                stmt.execute(params![category.id.0, category.label])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_elements_batch(&self, elements: &[Element]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO element (id, model_id, category_id, parent_id, label, class_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(id) DO NOTHING",
            )?;
            for element in elements {
                let class_name = if element.class_name.is_empty() {
                    "Element"
                } else {
                    element.class_name.as_str()
                };
                stmt.execute(params![
                    element.id.0,
                    element.model_id.0,
                    element.category_id.0,
                    element.parent_id.map(|id| id.0),
                    element.label,
                    class_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes elements together with their element sub-trees.
    pub fn remove_elements(&self, ids: &[ElementId]) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let sql = format!(
            "WITH RECURSIVE doomed(id) AS (
                 SELECT id FROM element WHERE id IN ({})
                 UNION
                 SELECT e.id FROM element e JOIN doomed d ON e.parent_id = d.id
             )
             DELETE FROM element WHERE id IN (SELECT id FROM doomed)",
            placeholders(ids.len())
        );
        let removed = tx.execute(&sql, rusqlite::params_from_iter(ids.iter().map(|id| id.0)))?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64, StorageError> {
            let sql = format!("SELECT count(*) FROM {table}");
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        };
        Ok(StorageStats {
            container_count: count("container")?,
            model_count: count("model")?,
            category_count: count("category")?,
            element_count: count("element")?,
        })
    }

    pub fn get_containers(&self) -> Result<Vec<Container>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, label, hidden_in_hierarchy, json_properties
             FROM container ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_mapping::container_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_element(&self, id: ElementId) -> Result<Option<Element>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, model_id, category_id, parent_id, label, class_name
             FROM element WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.0])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_mapping::element_from_row(row)?));
        }
        Ok(None)
    }

    pub fn get_elements_for_model(&self, model_id: ModelId) -> Result<Vec<Element>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, model_id, category_id, parent_id, label, class_name
             FROM element WHERE model_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![model_id.0], row_mapping::element_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_category_ids_with_label(
        &self,
        label: &str,
    ) -> Result<Vec<CategoryId>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM category WHERE label = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![label], |row| row.get::<_, i64>(0))?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(CategoryId)
            .collect())
    }

    /// Runs a structural query and materializes its rows.
    pub fn run_query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&query.sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into();
        let column_count = columns.len();

        let mut rows = stmt.query(rusqlite::params_from_iter(query.bindings.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(row_mapping::query_value_from_ref(row.get_ref(index)?));
            }
            result.push(QueryRow::new(Arc::clone(&columns), values));
        }
        tracing::debug!(
            target: QUERY_TARGET,
            query = query.name,
            bindings = query.bindings.len(),
            rows = result.len(),
            "structural query executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests;
