//! Bulk Executor (C13, spec §4.13).
//!
//! Parses newline-delimited action/document pairs. Each entry validates its
//! target index, performs the action, applies copy-to and nested-doc
//! extraction, updates the version via C8, and emits a per-item status entry.
//! Deliberately does not pre-check existence before index/create/update/delete;
//! `created` vs `updated` is classified from the post-op version instead,
//! trading strict `create` conflict detection for throughput.

use serde_json::{Map, Value as Json};

use crate::catalog::Catalog;
use crate::engine::SearchEngine;
use crate::error::{Error, Result};
use crate::value::Document;
use crate::version::VersionManager;
use crate::write::copy_to::apply_copy_to;
use crate::write::nested::extract_nested_children;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkAction {
    fn from_header_key(key: &str) -> Option<BulkAction> {
        match key {
            "index" => Some(BulkAction::Index),
            "create" => Some(BulkAction::Create),
            "update" => Some(BulkAction::Update),
            "delete" => Some(BulkAction::Delete),
            _ => None,
        }
    }

    fn action_key(self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

struct BulkItem {
    action: BulkAction,
    index: String,
    id: Option<String>,
    payload: Option<Json>,
}

/// Parses an NDJSON bulk body into action/document pairs. `delete` entries
/// have no document line; every other action does.
pub fn parse_bulk(ndjson: &str) -> Result<Vec<BulkItem>> {
    let mut lines = ndjson.lines().filter(|l| !l.trim().is_empty());
    let mut items = Vec::new();
    while let Some(header_line) = lines.next() {
        let header: Json = serde_json::from_str(header_line)?;
        let Json::Object(header) = header else {
            return Err(Error::BadRequest("bulk action header must be a JSON object".to_string()));
        };
        let (action_key, spec) = header
            .iter()
            .next()
            .ok_or_else(|| Error::BadRequest("bulk action header is empty".to_string()))?;
        let action = BulkAction::from_header_key(action_key)
            .ok_or_else(|| Error::BadRequest(format!("unknown bulk action: {action_key}")))?;
        let index = spec
            .get("_index")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::BadRequest("bulk action header missing _index".to_string()))?
            .to_string();
        let id = spec.get("_id").and_then(Json::as_str).map(str::to_string);

        let payload = if action == BulkAction::Delete {
            None
        } else {
            let doc_line = lines.next().ok_or_else(|| Error::BadRequest("bulk action missing document line".to_string()))?;
            Some(serde_json::from_str(doc_line)?)
        };
        items.push(BulkItem { action, index, id, payload });
    }
    Ok(items)
}

pub fn execute_bulk(engine: &dyn SearchEngine, catalog: &Catalog, versions: &VersionManager, ndjson: &str) -> Result<Vec<Json>> {
    let items = parse_bulk(ndjson)?;
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        results.push(execute_item(engine, catalog, versions, item));
    }
    Ok(results)
}

fn execute_item(engine: &dyn SearchEngine, catalog: &Catalog, versions: &VersionManager, item: BulkItem) -> Json {
    if !engine.index_exists(&item.index) {
        return item_response(item.action, &item.index, item.id.as_deref().unwrap_or(""), "not_found", 404, None);
    }

    match item.action {
        BulkAction::Index | BulkAction::Create => index_or_create(engine, catalog, versions, item),
        BulkAction::Update => update(engine, catalog, versions, item),
        BulkAction::Delete => delete(engine, versions, item),
    }
}

fn index_or_create(engine: &dyn SearchEngine, catalog: &Catalog, versions: &VersionManager, item: BulkItem) -> Json {
    let id = item.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut source = item.payload.unwrap_or(Json::Null);
    if let Ok(mapping) = catalog.mapping(&item.index) {
        apply_copy_to(&mut source, &mapping);
        for child in extract_nested_children(&id, &source, &mapping) {
            let child_doc = Document::from_source(&item.index, &child.id, child.source);
            if let Err(err) = engine.index_document(&item.index, &child.id, child_doc) {
                return item_response(item.action, &item.index, &id, "error", err.status_code(), None);
            }
        }
    }

    let doc = Document::from_source(&item.index, &id, source);
    if let Err(err) = engine.index_document(&item.index, &id, doc) {
        return item_response(item.action, &item.index, &id, "error", err.status_code(), None);
    }
    match versions.increment(&item.index, &id) {
        Ok(record) => {
            let status = if record.version == 1 { "created" } else { "updated" };
            item_response(item.action, &item.index, &id, status, 200, Some(record))
        }
        Err(err) => item_response(item.action, &item.index, &id, "error", err.status_code(), None),
    }
}

fn update(engine: &dyn SearchEngine, catalog: &Catalog, versions: &VersionManager, item: BulkItem) -> Json {
    let Some(id) = item.id else {
        return item_response(item.action, &item.index, "", "error", 400, None);
    };
    let existing = match engine.fetch_document(&item.index, &id) {
        Ok(doc) => doc,
        Err(err) => return item_response(item.action, &item.index, &id, "error", err.status_code(), None),
    };
    let Some(existing) = existing else {
        return item_response(item.action, &item.index, &id, "not_found", 404, None);
    };

    let patch = item.payload.as_ref().and_then(|p| p.get("doc")).cloned().unwrap_or_else(|| item.payload.clone().unwrap_or(Json::Null));
    let mut merged = existing.source_json();
    merge_shallow(&mut merged, &patch);
    if let Ok(mapping) = catalog.mapping(&item.index) {
        apply_copy_to(&mut merged, &mapping);
    }

    let doc = Document::from_source(&item.index, &id, merged);
    if let Err(err) = engine.index_document(&item.index, &id, doc) {
        return item_response(item.action, &item.index, &id, "error", err.status_code(), None);
    }
    match versions.increment(&item.index, &id) {
        Ok(record) => item_response(item.action, &item.index, &id, "updated", 200, Some(record)),
        Err(err) => item_response(item.action, &item.index, &id, "error", err.status_code(), None),
    }
}

fn delete(engine: &dyn SearchEngine, versions: &VersionManager, item: BulkItem) -> Json {
    let Some(id) = item.id else {
        return item_response(item.action, &item.index, "", "error", 400, None);
    };
    match engine.delete_document(&item.index, &id) {
        Ok(true) => {
            let tombstone = versions.delete(&item.index, &id).ok().flatten();
            item_response(item.action, &item.index, &id, "deleted", 200, tombstone)
        }
        Ok(false) => item_response(item.action, &item.index, &id, "not_found", 404, None),
        Err(err) => item_response(item.action, &item.index, &id, "error", err.status_code(), None),
    }
}

fn merge_shallow(target: &mut Json, patch: &Json) {
    if let (Json::Object(target), Json::Object(patch)) = (target, patch) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn item_response(action: BulkAction, index: &str, id: &str, result: &str, status: u16, record: Option<crate::version::VersionRecord>) -> Json {
    let mut body = Map::new();
    body.insert("_index".to_string(), Json::String(index.to_string()));
    body.insert("_id".to_string(), Json::String(id.to_string()));
    body.insert("result".to_string(), Json::String(result.to_string()));
    body.insert("status".to_string(), Json::from(status));
    body.insert("_shards".to_string(), serde_json::json!({"total": 1, "successful": 1, "failed": 0}));
    if let Some(record) = record {
        body.insert("_version".to_string(), Json::from(record.version));
        body.insert("_seq_no".to_string(), Json::from(record.seq_no));
        body.insert("_primary_term".to_string(), Json::from(record.primary_term));
    }
    serde_json::json!({ action.action_key(): Json::Object(body) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    fn fixture() -> (MemoryEngine, Catalog, VersionManager) {
        let engine = MemoryEngine::new();
        engine.create_index("products");
        (engine, Catalog::new(), VersionManager::new())
    }

    #[test]
    fn index_action_creates_a_new_document() {
        let (engine, catalog, versions) = fixture();
        let ndjson = "{\"index\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"name\":\"widget\"}\n";
        let results = execute_bulk(&engine, &catalog, &versions, ndjson).unwrap();
        assert_eq!(results[0]["index"]["result"], "created");
    }

    #[test]
    fn reindexing_same_id_reports_updated() {
        let (engine, catalog, versions) = fixture();
        let ndjson = "{\"index\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"name\":\"widget\"}\n{\"index\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"name\":\"widget-v2\"}\n";
        let results = execute_bulk(&engine, &catalog, &versions, ndjson).unwrap();
        assert_eq!(results[0]["index"]["result"], "created");
        assert_eq!(results[1]["index"]["result"], "updated");
    }

    #[test]
    fn delete_action_reports_not_found_when_absent() {
        let (engine, catalog, versions) = fixture();
        let ndjson = "{\"delete\":{\"_index\":\"products\",\"_id\":\"missing\"}}\n";
        let results = execute_bulk(&engine, &catalog, &versions, ndjson).unwrap();
        assert_eq!(results[0]["delete"]["result"], "not_found");
    }

    #[test]
    fn update_merges_doc_field_into_existing_source() {
        let (engine, catalog, versions) = fixture();
        let index_ndjson = "{\"index\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"name\":\"widget\",\"price\":9.99}\n";
        execute_bulk(&engine, &catalog, &versions, index_ndjson).unwrap();

        let update_ndjson = "{\"update\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"doc\":{\"price\":12.99}}\n";
        let results = execute_bulk(&engine, &catalog, &versions, update_ndjson).unwrap();
        assert_eq!(results[0]["update"]["result"], "updated");

        let doc = engine.fetch_document("products", "1").unwrap().unwrap();
        assert_eq!(doc.get("price").unwrap().as_f64(), Some(12.99));
        assert_eq!(doc.get("name").unwrap().as_str(), Some("widget"));
    }

    #[test]
    fn unknown_index_reports_not_found_without_failing_the_batch() {
        let (engine, catalog, versions) = fixture();
        let ndjson = "{\"index\":{\"_index\":\"missing\",\"_id\":\"1\"}}\n{\"name\":\"x\"}\n";
        let results = execute_bulk(&engine, &catalog, &versions, ndjson).unwrap();
        assert_eq!(results[0]["index"]["result"], "not_found");
    }
}
