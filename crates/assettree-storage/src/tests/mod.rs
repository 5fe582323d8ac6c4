use super::*;

fn seed(storage: &Storage) -> Result<(), StorageError> {
    storage.insert_containers_batch(&[
        Container {
            id: ContainerId(1),
            label: "Root".to_string(),
            ..Default::default()
        },
        Container {
            id: ContainerId(2),
            parent_id: Some(ContainerId(1)),
            label: "Bridge".to_string(),
            hidden_in_hierarchy: true,
            json_properties: Some(r#"{"subject":{"model":{"targetPartition":10}}}"#.to_string()),
        },
    ])?;
    storage.insert_models_batch(&[Model {
        id: ModelId(10),
        label: "Physical".to_string(),
        owner_container_id: Some(ContainerId(1)),
        ..Default::default()
    }])?;
    storage.insert_categories_batch(&[Category {
        id: CategoryId(100),
        label: "Walls".to_string(),
    }])?;
    // Child before parent: the deferred key accepts it at commit.
    storage.insert_elements_batch(&[
        Element {
            id: ElementId(1001),
            model_id: ModelId(10),
            category_id: CategoryId(100),
            parent_id: Some(ElementId(1000)),
            label: "Door".to_string(),
            ..Default::default()
        },
        Element {
            id: ElementId(1000),
            model_id: ModelId(10),
            category_id: CategoryId(100),
            label: "Wall".to_string(),
            class_name: "Wall".to_string(),
            ..Default::default()
        },
    ])?;
    Ok(())
}

#[test]
fn test_batch_inserts() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;

    let stats = storage.get_stats()?;
    assert_eq!(stats.container_count, 2);
    assert_eq!(stats.model_count, 1);
    assert_eq!(stats.category_count, 1);
    assert_eq!(stats.element_count, 2);

    let containers = storage.get_containers()?;
    assert!(containers[1].hidden_in_hierarchy);
    assert_eq!(containers[1].parent_id, Some(ContainerId(1)));

    let door = storage.get_element(ElementId(1001))?.expect("door exists");
    assert_eq!(door.parent_id, Some(ElementId(1000)));
    assert_eq!(door.class_name, "Element");
    Ok(())
}

#[test]
fn test_hierarchy_indexes_are_created() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    let conn = storage.conn.lock();

    let mut stmt = conn.prepare("PRAGMA index_list('element')")?;
    let indexes = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    assert!(indexes.iter().any(|name| name == "idx_element_parent"));
    assert!(indexes.iter().any(|name| name == "idx_element_model_category"));
    Ok(())
}

#[test]
fn test_run_query_maps_named_columns() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;

    let query = StructuralQuery::new(
        "test_elements",
        "SELECT id, parent_id, label FROM element WHERE model_id = ? ORDER BY id",
    )
    .bind(10_i64);
    let rows = storage.run_query(&query)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].i64("id")?, 1000);
    assert_eq!(rows[0].opt_i64("parent_id")?, None);
    assert_eq!(rows[1].opt_i64("parent_id")?, Some(1000));
    assert_eq!(rows[1].str("label")?, "Door");
    assert!(matches!(
        rows[0].value("missing"),
        Err(StorageError::MissingColumn(_))
    ));
    assert!(matches!(
        rows[0].str("id"),
        Err(StorageError::UnexpectedValue { .. })
    ));
    Ok(())
}

#[test]
fn test_recursive_query_walks_element_tree() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;

    let query = StructuralQuery::new(
        "test_subtree",
        "WITH RECURSIVE scoped(id) AS (
             SELECT id FROM element WHERE model_id = ?1 AND category_id = ?2 AND parent_id IS NULL
             UNION ALL
             SELECT e.id FROM element e JOIN scoped s ON e.parent_id = s.id
         )
         SELECT COUNT(*) AS element_count FROM scoped",
    )
    .bind(10_i64)
    .bind(100_i64);
    let rows = storage.run_query(&query)?;
    assert_eq!(rows[0].i64("element_count")?, 2);
    Ok(())
}

#[test]
fn test_remove_elements_removes_subtree() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;

    let removed = storage.remove_elements(&[ElementId(1000)])?;
    assert_eq!(removed, 2);
    assert!(storage.get_elements_for_model(ModelId(10))?.is_empty());
    Ok(())
}

#[test]
fn test_clear_removes_everything() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;
    storage.clear()?;
    assert_eq!(storage.get_stats()?, StorageStats::default());
    Ok(())
}

#[test]
fn test_file_backed_storage_reopens() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("tree.db");
    {
        let storage = Storage::open(&path)?;
        seed(&storage)?;
    }
    let reopened = Storage::open(&path)?;
    assert_eq!(reopened.get_stats()?.element_count, 2);
    assert_eq!(
        reopened.get_category_ids_with_label("Walls")?,
        vec![CategoryId(100)]
    );
    Ok(())
}

#[tokio::test]
async fn test_backing_store_trait_object() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    seed(&storage)?;
    let store: Arc<dyn BackingStore> = Arc::new(storage);

    let rows = store
        .query(&StructuralQuery::new("test_models", "SELECT id FROM model"))
        .await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn test_newer_schema_version_is_rejected() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("tree.db");
    {
        let storage = Storage::open(&path)?;
        let conn = storage.conn.lock();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        assert_eq!(version, i64::from(SCHEMA_VERSION));
        conn.pragma_update(None, "user_version", "99")?;
    }

    let result = Storage::open(&path);
    assert!(matches!(result, Err(StorageError::Other(message)) if message.contains("99")));
    Ok(())
}
