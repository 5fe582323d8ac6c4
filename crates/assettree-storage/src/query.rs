use super::*;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;

/// Scalar bound into, or read out of, a structural query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Integer(value as i64)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Null, Into::into)
    }
}

impl ToSql for QueryValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            QueryValue::Null => ToSqlOutput::Owned(Value::Null),
            QueryValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            QueryValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            QueryValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// A structural query submitted to the backing store: SQL text (optionally
/// with a recursive clause) plus positional parameter bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralQuery {
    /// Short name used in logs and by instrumented stores.
    pub name: &'static str,
    pub sql: String,
    pub bindings: Vec<QueryValue>,
}

impl StructuralQuery {
    pub fn new(name: &'static str, sql: impl Into<String>) -> Self {
        Self {
            name,
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<QueryValue>) -> Self {
        self.bindings.push(value.into());
        self
    }

    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        self.bindings.extend(values.into_iter().map(Into::into));
        self
    }
}

/// `?,?,?` placeholder list for an `IN (...)` clause of `count` bindings.
pub fn placeholders(count: usize) -> String {
    std::iter::repeat_n("?", count).collect::<Vec<_>>().join(",")
}

/// One result row with named columns.
#[derive(Debug, Clone)]
pub struct QueryRow {
    columns: Arc<[String]>,
    values: Vec<QueryValue>,
}

impl QueryRow {
    pub fn new(columns: Arc<[String]>, values: Vec<QueryValue>) -> Self {
        Self { columns, values }
    }

    pub fn value(&self, column: &str) -> Result<&QueryValue, StorageError> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| StorageError::MissingColumn(column.to_string()))
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, StorageError> {
        match self.value(column)? {
            QueryValue::Null => Ok(None),
            QueryValue::Integer(v) => Ok(Some(*v)),
            _ => Err(StorageError::UnexpectedValue {
                column: column.to_string(),
                expected: "integer",
            }),
        }
    }

    pub fn i64(&self, column: &str) -> Result<i64, StorageError> {
        self.opt_i64(column)?.ok_or_else(|| StorageError::UnexpectedValue {
            column: column.to_string(),
            expected: "non-null integer",
        })
    }

    pub fn bool(&self, column: &str) -> Result<bool, StorageError> {
        Ok(self.opt_i64(column)?.unwrap_or(0) != 0)
    }

    pub fn opt_str(&self, column: &str) -> Result<Option<&str>, StorageError> {
        match self.value(column)? {
            QueryValue::Null => Ok(None),
            QueryValue::Text(v) => Ok(Some(v.as_str())),
            _ => Err(StorageError::UnexpectedValue {
                column: column.to_string(),
                expected: "text",
            }),
        }
    }

    pub fn str(&self, column: &str) -> Result<&str, StorageError> {
        self.opt_str(column)?.ok_or_else(|| StorageError::UnexpectedValue {
            column: column.to_string(),
            expected: "non-null text",
        })
    }
}

/// Query-submission capability of the backing store.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError>;
}

#[async_trait]
impl BackingStore for Storage {
    async fn query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError> {
        self.run_query(query)
    }
}

#[async_trait]
impl<T: BackingStore + ?Sized> BackingStore for Arc<T> {
    async fn query(&self, query: &StructuralQuery) -> Result<Vec<QueryRow>, StorageError> {
        (**self).query(query).await
    }
}
