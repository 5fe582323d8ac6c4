use super::*;
use rusqlite::types::ValueRef;

pub(super) fn query_value_from_ref(value: ValueRef<'_>) -> QueryValue {
    match value {
        ValueRef::Null => QueryValue::Null,
        ValueRef::Integer(v) => QueryValue::Integer(v),
        ValueRef::Real(v) => QueryValue::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            QueryValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

pub(super) fn container_from_row(row: &Row) -> rusqlite::Result<Container> {
    Ok(Container {
        id: ContainerId(row.get(0)?),
        parent_id: row.get::<_, Option<i64>>(1)?.map(ContainerId),
        label: row.get(2)?,
        hidden_in_hierarchy: row.get(3)?,
        json_properties: row.get(4)?,
    })
}

pub(super) fn element_from_row(row: &Row) -> rusqlite::Result<Element> {
    Ok(Element {
        id: ElementId(row.get(0)?),
        model_id: ModelId(row.get(1)?),
        category_id: CategoryId(row.get(2)?),
        parent_id: row.get::<_, Option<i64>>(3)?.map(ElementId),
        label: row.get(4)?,
        class_name: row.get(5)?,
    })
}
