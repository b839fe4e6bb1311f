//! Response Shaper (C10, spec §4.10 / §6).
//!
//! Assembles the final wire shape for a search/scroll response. Aggregation
//! placeholder shaping for "no matching documents" is handled by the
//! aggregation executor itself (every [`crate::agg::AggNode`] always
//! produces its type's empty shape); this module only assembles the
//! envelope around it.

use serde_json::{Map, Value as Json};

use crate::search::{HitResult, SearchOutcome};

const INDEX_NAME_PLACEHOLDER_SHARDS: u32 = 1;

pub fn shape_search_response(index: &str, outcome: &SearchOutcome, scroll_id: Option<&str>) -> Json {
    let hits: Vec<Json> = outcome.hits.iter().map(|hit| shape_hit(index, hit)).collect();

    let mut body = serde_json::json!({
        "_shards": {"total": INDEX_NAME_PLACEHOLDER_SHARDS, "successful": INDEX_NAME_PLACEHOLDER_SHARDS, "skipped": 0, "failed": 0},
        "hits": {
            "total": {"value": outcome.total, "relation": "eq"},
            "max_score": if outcome.hits.is_empty() { Json::Null } else { serde_json::json!(outcome.max_score) },
            "hits": hits,
        },
        "timed_out": false,
        "took": outcome.took_ms,
    });

    if let Some(aggregations) = &outcome.aggregations {
        body["aggregations"] = Json::Object(aggregations.clone());
    }
    if let Some(scroll_id) = scroll_id {
        body["_scroll_id"] = Json::String(scroll_id.to_string());
    }
    body
}

fn shape_hit(index: &str, hit: &HitResult) -> Json {
    let mut obj = Map::new();
    obj.insert("_index".to_string(), Json::String(index.to_string()));
    obj.insert("_id".to_string(), Json::String(hit.id.clone()));
    obj.insert("_score".to_string(), serde_json::json!(hit.score));
    if let Some(source) = &hit.source {
        obj.insert("_source".to_string(), source.clone());
    }
    if let Some(highlight) = &hit.highlight {
        obj.insert("highlight".to_string(), Json::Object(highlight.clone()));
    }
    if let Some(explanation) = &hit.explanation {
        obj.insert("_explanation".to_string(), explanation.clone());
    }
    if !hit.sort.is_empty() {
        obj.insert("sort".to_string(), Json::Array(hit.sort.iter().map(|v| v.to_json()).collect()));
    }
    if let Some(fields) = &hit.script_fields {
        obj.insert("fields".to_string(), Json::Object(fields.clone()));
    }
    Json::Object(obj)
}

pub fn shape_error(status: u16, kind: &str, reason: &str) -> Json {
    serde_json::json!({"error": {"type": kind, "reason": reason}, "status": status})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchOutcome;

    #[test]
    fn empty_result_set_shapes_total_zero_and_no_max_score() {
        let outcome = SearchOutcome { hits: Vec::new(), total: 0, max_score: 0.0, aggregations: None, took_ms: 1 };
        let body = shape_search_response("products", &outcome, None);
        assert_eq!(body["hits"]["total"], serde_json::json!({"value": 0, "relation": "eq"}));
        assert_eq!(body["hits"]["max_score"], Json::Null);
        assert!(body.get("aggregations").is_none());
    }

    #[test]
    fn scroll_id_is_attached_when_present() {
        let outcome = SearchOutcome { hits: Vec::new(), total: 0, max_score: 0.0, aggregations: None, took_ms: 1 };
        let body = shape_search_response("products", &outcome, Some("abc123"));
        assert_eq!(body["_scroll_id"], Json::String("abc123".to_string()));
    }

    #[test]
    fn error_shape_matches_wire_contract() {
        let body = shape_error(404, "not_found", "index not found: products");
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"]["type"], "not_found");
    }
}
