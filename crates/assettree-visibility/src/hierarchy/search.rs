use super::HierarchyDefinition;
use crate::error::{TreeError, TreeResult};
use assettree_core::{EntityKind, HierarchyPath, InstanceKey};
use assettree_events::telemetry::{
    OP_LABEL_SEARCH, debug_context, new_correlation_id, operation_failure, operation_start,
    operation_success,
};
use assettree_storage::StructuralQuery;
use std::time::Instant;

const LABEL_SEARCH_SQL: &str = r"SELECT 0 AS kind, c.id AS id FROM container c
        WHERE c.label LIKE ? ESCAPE '\' AND c.hidden_in_hierarchy = 0
     UNION
     SELECT 1, m.id FROM model m
        WHERE m.label LIKE ? ESCAPE '\' AND m.hidden_in_hierarchy = 0 AND m.is_private = 0
     UNION
     SELECT 2, c.id FROM category c
        WHERE c.label LIKE ? ESCAPE '\'
     UNION
     SELECT 3, e.id FROM element e
        WHERE e.label LIKE ? ESCAPE '\'
     ORDER BY kind, id
     LIMIT ?";

/// `%text%` with the LIKE wildcards of `text` escaped.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

impl HierarchyDefinition {
    /// Paths to every entity whose label contains `text`.
    ///
    /// A newer search supersedes this one: a superseded search fails with
    /// [`TreeError::Superseded`] at its next suspension point.
    pub async fn find_paths_by_label(&self, text: &str) -> TreeResult<Vec<HierarchyPath>> {
        let token = self.searches.begin();
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        operation_start(OP_LABEL_SEARCH, &correlation_id, text);

        let result = async {
            let targets = self.label_targets(text).await?;
            token.ensure_current()?;
            debug_context(
                OP_LABEL_SEARCH,
                &correlation_id,
                &format!("{} matching targets", targets.len()),
            );
            let paths = self.collect_paths(&targets).await?;
            token.ensure_current()?;
            Ok::<_, TreeError>(paths)
        }
        .await;

        match &result {
            Ok(_) => {
                operation_success(
                    OP_LABEL_SEARCH,
                    &correlation_id,
                    Some(started.elapsed().as_millis()),
                );
            }
            Err(err) => {
                operation_failure(OP_LABEL_SEARCH, &correlation_id, Some(err.to_string()));
            }
        }
        result
    }

    /// Abandon any label search still in flight.
    pub fn cancel_label_search(&self) {
        self.searches.cancel_all();
    }

    async fn label_targets(&self, text: &str) -> TreeResult<Vec<InstanceKey>> {
        let limit = self.config.search_limit;
        let pattern = like_pattern(text);
        let query = StructuralQuery::new("label_search", LABEL_SEARCH_SQL)
            .bind_all(std::iter::repeat_n(pattern, 4))
            .bind(limit.saturating_add(1) as i64);
        let rows = self.cache.store().query(&query).await?;
        if rows.len() > limit {
            return Err(TreeError::SearchLimitExceeded { limit });
        }

        rows.iter()
            .map(|row| -> TreeResult<InstanceKey> {
                let kind = i32::try_from(row.i64("kind")?)
                    .map_err(|_| TreeError::MalformedRow("label search kind".to_string()))?;
                let id = row.i64("id")?;
                let kind = EntityKind::try_from(kind)
                    .map_err(|err| TreeError::MalformedRow(err.to_string()))?;
                Ok(InstanceKey::from_raw(kind, id))
            })
            .collect()
    }
}
