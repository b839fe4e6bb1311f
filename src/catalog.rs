//! Index Catalog: a thin directory/mapping collaborator (spec §9.1).
//!
//! Tracks, per index: whether it exists, its `copy_to` field-path → target-paths
//! table, and which field paths are nested (array-of-object) mappings. Used by
//! the copy-to/nested-doc preprocessors (C11) and the bulk executor (C13).
//! Deliberately thin — directory/metadata stores are out of scope (spec §1).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct IndexMapping {
    /// field path -> list of target field paths its value is copied into.
    copy_to: HashMap<String, Vec<String>>,
    /// field paths mapped as `nested` (array-of-object children).
    nested_paths: Vec<String>,
}

impl IndexMapping {
    pub fn with_copy_to(mut self, field: impl Into<String>, targets: Vec<String>) -> Self {
        self.copy_to.insert(field.into(), targets);
        self
    }

    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_paths.push(path.into());
        self
    }

    pub fn copy_to_targets(&self, field: &str) -> &[String] {
        self.copy_to.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nested_paths(&self) -> &[String] {
        &self.nested_paths
    }

    pub fn is_nested_path(&self, path: &str) -> bool {
        self.nested_paths.iter().any(|p| p == path)
    }
}

pub struct Catalog {
    indexes: RwLock<HashMap<String, IndexMapping>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self { indexes: RwLock::new(HashMap::new()) }
    }

    pub fn register_index(&self, name: &str, mapping: IndexMapping) {
        self.indexes.write().insert(name.to_string(), mapping);
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    pub fn mapping(&self, name: &str) -> Result<IndexMapping> {
        self.indexes.read().get(name).cloned().ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub fn all_indexes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_index_is_not_found() {
        let catalog = Catalog::new();
        assert!(!catalog.has_index("products"));
        assert!(matches!(catalog.mapping("products").unwrap_err(), Error::IndexNotFound(_)));
    }

    #[test]
    fn copy_to_targets_are_retrievable_by_field() {
        let mapping = IndexMapping::default().with_copy_to("title", vec!["all_text".to_string()]);
        let catalog = Catalog::new();
        catalog.register_index("products", mapping);
        let mapping = catalog.mapping("products").unwrap();
        assert_eq!(mapping.copy_to_targets("title"), &["all_text".to_string()]);
        assert!(mapping.copy_to_targets("price").is_empty());
    }

    #[test]
    fn nested_paths_are_tracked() {
        let mapping = IndexMapping::default().with_nested_path("reviews");
        let catalog = Catalog::new();
        catalog.register_index("products", mapping);
        let mapping = catalog.mapping("products").unwrap();
        assert!(mapping.is_nested_path("reviews"));
        assert!(!mapping.is_nested_path("tags"));
    }
}
