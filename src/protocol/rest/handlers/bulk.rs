//! `POST /_bulk`, `POST /{index}/_bulk` (spec §6/C13): newline-delimited bulk body.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value as Json_;

use crate::write::execute_bulk;
use crate::Gateway;

use crate::protocol::rest::error::RestError;

pub async fn bulk(State(gateway): State<Arc<Gateway>>, body: String) -> Result<(StatusCode, Json<Json_>), RestError> {
    let items = execute_bulk(gateway.engine(), &gateway.catalog, &gateway.versions, &body)?;
    let has_errors = items.iter().any(|item| item.as_object().and_then(|o| o.values().next()).and_then(|v| v.get("status")).and_then(Json_::as_u64).is_some_and(|s| s >= 300));
    Ok((StatusCode::OK, Json(serde_json::json!({"errors": has_errors, "items": items}))))
}

/// Scoped variant for `/{index}/_bulk`: action headers that omit `_index`
/// default to the path's index.
pub async fn bulk_scoped(State(gateway): State<Arc<Gateway>>, axum::extract::Path(index): axum::extract::Path<String>, body: String) -> Result<(StatusCode, Json<Json_>), RestError> {
    let scoped = scope_to_index(&body, &index);
    let items = execute_bulk(gateway.engine(), &gateway.catalog, &gateway.versions, &scoped)?;
    let has_errors = items.iter().any(|item| item.as_object().and_then(|o| o.values().next()).and_then(|v| v.get("status")).and_then(Json_::as_u64).is_some_and(|s| s >= 300));
    Ok((StatusCode::OK, Json(serde_json::json!({"errors": has_errors, "items": items}))))
}

/// Walks action/doc pairs the same way the bulk executor does (a `delete`
/// entry has no doc line), filling in `_index` on headers that omit it.
fn scope_to_index(ndjson: &str, index: &str) -> String {
    let mut out = String::with_capacity(ndjson.len());
    let mut expect_doc = false;
    for line in ndjson.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if expect_doc {
            out.push_str(line);
            out.push('\n');
            expect_doc = false;
            continue;
        }
        let Ok(mut header) = serde_json::from_str::<Json_>(line) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let action_key = header.as_object().and_then(|o| o.keys().next()).cloned();
        if let Some(spec) = header.as_object_mut().and_then(|o| o.values_mut().next()).and_then(Json_::as_object_mut) {
            spec.entry("_index").or_insert_with(|| Json_::String(index.to_string()));
        }
        out.push_str(&header.to_string());
        out.push('\n');
        expect_doc = action_key.as_deref() != Some("delete");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_to_index_fills_in_missing_index_field() {
        let ndjson = "{\"index\":{\"_id\":\"1\"}}\n{\"name\":\"widget\"}\n";
        let scoped = scope_to_index(ndjson, "products");
        assert!(scoped.contains("\"_index\":\"products\""));
    }

    #[test]
    fn scope_to_index_leaves_an_explicit_index_untouched() {
        let ndjson = "{\"index\":{\"_index\":\"other\",\"_id\":\"1\"}}\n{\"name\":\"widget\"}\n";
        let scoped = scope_to_index(ndjson, "products");
        assert!(scoped.contains("\"_index\":\"other\""));
    }
}
