//! Nested-document preprocessor (C11, spec §4.11).
//!
//! For nested-document mappings, each array-of-object child at a mapped
//! nested path is extracted into an auxiliary indexed document with id
//! `"<parent-id>#<child-ix>"` and path metadata. The parent document retains
//! the original array for `_source` round-tripping.

use serde_json::Value as Json;

use crate::catalog::IndexMapping;

/// A synthetic child document produced from a nested array element.
pub struct NestedChild {
    pub id: String,
    pub path: String,
    pub source: Json,
}

/// Walks `source`'s nested-mapped paths and produces one [`NestedChild`] per
/// array element. The parent document's `source` is returned unmodified.
pub fn extract_nested_children(parent_id: &str, source: &Json, mapping: &IndexMapping) -> Vec<NestedChild> {
    let mut children = Vec::new();
    let Json::Object(map) = source else { return children };
    for path in mapping.nested_paths() {
        let Some(Json::Array(items)) = map.get(path) else { continue };
        for (ix, item) in items.iter().enumerate() {
            let mut child_source = item.clone();
            if let Json::Object(obj) = &mut child_source {
                obj.insert("_nested_path".to_string(), Json::String(path.clone()));
                obj.insert("_nested_parent".to_string(), Json::String(parent_id.to_string()));
            }
            children.push(NestedChild { id: format!("{parent_id}#{ix}"), path: path.clone(), source: child_source });
        }
    }
    children
}
