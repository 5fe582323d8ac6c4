use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tree session settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Group sibling elements under synthetic class-grouping nodes.
    pub group_elements_by_class: bool,
    /// Maximum number of label-search targets before the search is rejected.
    pub search_limit: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            group_elements_by_class: true,
            search_limit: 1000,
        }
    }
}

impl TreeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TreeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
