use super::*;

// Self-referencing keys are deferred so batches may insert children before
// their parents inside one transaction.
const TABLE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS container (
        id INTEGER PRIMARY KEY,
        parent_id INTEGER,
        label TEXT NOT NULL,
        hidden_in_hierarchy INTEGER NOT NULL DEFAULT 0,
        json_properties TEXT,
        FOREIGN KEY(parent_id) REFERENCES container(id) DEFERRABLE INITIALLY DEFERRED
    )",
    "CREATE TABLE IF NOT EXISTS model (
        id INTEGER PRIMARY KEY,
        label TEXT NOT NULL,
        owner_container_id INTEGER,
        modeled_element_id INTEGER,
        is_private INTEGER NOT NULL DEFAULT 0,
        hidden_in_hierarchy INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(owner_container_id) REFERENCES container(id)
    )",
    "CREATE TABLE IF NOT EXISTS category (
        id INTEGER PRIMARY KEY,
        label TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS element (
        id INTEGER PRIMARY KEY,
        model_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        parent_id INTEGER,
        label TEXT NOT NULL,
        class_name TEXT NOT NULL DEFAULT 'Element',
        FOREIGN KEY(model_id) REFERENCES model(id),
        FOREIGN KEY(category_id) REFERENCES category(id),
        FOREIGN KEY(parent_id) REFERENCES element(id) DEFERRABLE INITIALLY DEFERRED
    )",
];

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_container_parent ON container(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_model_owner ON model(owner_container_id)",
    "CREATE INDEX IF NOT EXISTS idx_model_modeled_element ON model(modeled_element_id)",
    "CREATE INDEX IF NOT EXISTS idx_element_parent ON element(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_element_model_category ON element(model_id, category_id)",
    "CREATE INDEX IF NOT EXISTS idx_element_label ON element(label)",
];

pub(super) fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn create_indexes(conn: &Connection) -> Result<(), StorageError> {
    for statement in INDEX_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

/// Stamps a fresh database with the current version and refuses databases
/// written by a newer schema.
pub(super) fn check_schema_version(conn: &Connection) -> Result<(), StorageError> {
    let stored_version = schema_version(conn)?;
    if stored_version > SCHEMA_VERSION {
        return Err(StorageError::Other(format!(
            "Unsupported database schema version: {stored_version} \
             (max supported: {SCHEMA_VERSION})"
        )));
    }
    if stored_version < SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as u32)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version.to_string())?;
    Ok(())
}
