//! Request-body parsing for the search/count endpoints (spec §6: "Recognised
//! keys: query, from, size, sort, _source, fields, script_fields, highlight,
//! aggs|aggregations, post_filter, min_score, explain, search_after").

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::agg::parse_aggs;
use crate::engine::SortField;
use crate::error::{Error, Result};
use crate::query::{parse_query, QueryNode};
use crate::search::SearchRequest;
use crate::value::Value;

/// Parses a search request body against a default result size (from config).
/// An empty/absent body (`Json::Null`) is treated as `match_all` with the
/// caller's defaults, matching a bare `GET /{index}/_search`.
pub fn parse_search_request(body: &Json, default_size: usize) -> Result<SearchRequest> {
    let body = match body {
        Json::Null => return Ok(SearchRequest { size: default_size, ..SearchRequest::default() }),
        Json::Object(_) => body,
        _ => return Err(Error::BadRequest("request body must be a JSON object".to_string())),
    };

    let query = match body.get("query") {
        Some(q) => parse_query(q)?,
        None => QueryNode::match_all(),
    };
    let post_filter = body.get("post_filter").map(parse_query).transpose()?;
    let from = body.get("from").and_then(Json::as_u64).unwrap_or(0) as usize;
    let size = body.get("size").and_then(Json::as_u64).map_or(default_size, |s| s as usize);
    let sort = body.get("sort").map(parse_sort).transpose()?.unwrap_or_default();
    let search_after = body.get("search_after").map(parse_search_after).transpose()?;
    let source_includes = parse_source_includes(body);
    let script_fields = parse_script_fields(body);
    let (highlight_fields, highlight_style) = parse_highlight(body);
    let min_score = body.get("min_score").and_then(Json::as_f64).map(|v| v as f32);
    let explain = body.get("explain").and_then(Json::as_bool).unwrap_or(false);

    let aggs_json = body.get("aggs").or_else(|| body.get("aggregations"));
    let aggs = match aggs_json {
        Some(spec) => {
            let (nodes, warnings) = parse_aggs(spec)?;
            for warning in &warnings {
                tracing::warn!(agg = %warning.name, reason = %warning.reason, "aggregation parse warning");
            }
            nodes
        }
        None => Vec::new(),
    };

    Ok(SearchRequest {
        query,
        from,
        size,
        sort,
        search_after,
        source_includes,
        script_fields,
        highlight_fields,
        highlight_style,
        aggs,
        post_filter,
        min_score,
        explain,
    })
}

fn parse_sort(json: &Json) -> Result<Vec<SortField>> {
    let Json::Array(items) = json else {
        return Err(Error::BadRequest("sort must be an array".to_string()));
    };
    items.iter().map(parse_sort_entry).collect()
}

fn parse_sort_entry(entry: &Json) -> Result<SortField> {
    match entry {
        Json::String(field) => {
            if let Some(name) = field.strip_suffix(":desc") {
                Ok(SortField { field: name.to_string(), descending: true })
            } else if let Some(name) = field.strip_suffix(":asc") {
                Ok(SortField { field: name.to_string(), descending: false })
            } else {
                Ok(SortField::asc(field.clone()))
            }
        }
        Json::Object(map) => {
            let (field, spec) = map.iter().next().ok_or_else(|| Error::BadRequest("empty sort entry".to_string()))?;
            let order = match spec {
                Json::String(order) => order.as_str(),
                Json::Object(inner) => inner.get("order").and_then(Json::as_str).unwrap_or("asc"),
                _ => "asc",
            };
            Ok(SortField { field: field.clone(), descending: order.eq_ignore_ascii_case("desc") })
        }
        _ => Err(Error::BadRequest("sort entries must be a string or object".to_string())),
    }
}

fn parse_search_after(json: &Json) -> Result<Vec<Value>> {
    let Json::Array(items) = json else {
        return Err(Error::BadRequest("search_after must be an array".to_string()));
    };
    Ok(items.iter().map(Value::from_json).collect())
}

fn parse_source_includes(body: &serde_json::Map<String, Json>) -> Vec<String> {
    let from_key = |key: &str| -> Option<Vec<String>> {
        match body.get(key)? {
            Json::Array(items) => Some(items.iter().filter_map(Json::as_str).map(str::to_string).collect()),
            Json::String(s) => Some(vec![s.clone()]),
            Json::Bool(false) => Some(Vec::new()),
            _ => None,
        }
    };
    from_key("_source").or_else(|| from_key("fields")).unwrap_or_default()
}

fn parse_script_fields(body: &serde_json::Map<String, Json>) -> BTreeMap<String, Json> {
    match body.get("script_fields") {
        Some(Json::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

fn parse_highlight(body: &serde_json::Map<String, Json>) -> (Vec<String>, Option<String>) {
    let Some(Json::Object(highlight)) = body.get("highlight") else {
        return (Vec::new(), None);
    };
    let fields = match highlight.get("fields") {
        Some(Json::Object(map)) => map.keys().cloned().collect(),
        Some(Json::Array(items)) => items.iter().filter_map(Json::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    let style = highlight.get("pre_tags").and_then(|v| v.as_array()).and_then(|a| a.first()).and_then(Json::as_str).map(|tag| tag.trim_matches(['<', '>']).to_string());
    (fields, style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_defaults_to_match_all_with_default_size() {
        let req = parse_search_request(&Json::Null, 10).unwrap();
        assert_eq!(req.size, 10);
        assert!(matches!(req.query, QueryNode::MatchAll { .. }));
    }

    #[test]
    fn sort_strings_with_colon_suffix_set_direction() {
        let body = json!({"sort": ["price:desc", "name"]});
        let req = parse_search_request(&body, 10).unwrap();
        assert_eq!(req.sort[0].field, "price");
        assert!(req.sort[0].descending);
        assert!(!req.sort[1].descending);
    }

    #[test]
    fn sort_objects_with_order_field_are_supported() {
        let body = json!({"sort": [{"price": {"order": "desc"}}]});
        let req = parse_search_request(&body, 10).unwrap();
        assert_eq!(req.sort[0].field, "price");
        assert!(req.sort[0].descending);
    }

    #[test]
    fn source_field_false_means_no_source() {
        let body = json!({"_source": false});
        let req = parse_search_request(&body, 10).unwrap();
        assert!(req.source_includes.is_empty());
    }

    #[test]
    fn highlight_fields_object_keys_are_collected() {
        let body = json!({"highlight": {"fields": {"title": {}}}});
        let req = parse_search_request(&body, 10).unwrap();
        assert_eq!(req.highlight_fields, vec!["title".to_string()]);
    }

    #[test]
    fn non_object_body_is_a_bad_request() {
        let err = parse_search_request(&json!([1, 2]), 10).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
