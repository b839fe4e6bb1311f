//! JSON → [`AggNode`] plan parser, and the reverse serializer (C3).

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::query::ast::QueryNode;
use crate::query::parser::{parse_query, try_parse_date};
use crate::value::Value;

use super::plan::{AggKind, AggNode, CompositeSource, GapPolicy, ParseWarning, TopHitsSpec, UserRange};

const RECOGNISED_SIBLINGS: &[&str] = &["aggs", "aggregations", "meta"];

const KNOWN_AGG_TYPES: &[&str] = &[
    "terms",
    "range",
    "date_range",
    "avg",
    "sum",
    "min",
    "max",
    "stats",
    "cardinality",
    "composite",
    "filter",
    "nested",
    "top_hits",
    "bucket_script",
    "scripted_metric",
];

/// Parse a top-level `aggs`/`aggregations` object. Unknown agg types are
/// collected as warnings and the entry is dropped rather than failing the
/// whole request.
pub fn parse_aggs(json: &Json) -> Result<(Vec<AggNode>, Vec<ParseWarning>)> {
    let obj = json.as_object().ok_or_else(|| Error::InvalidQuery("aggs must be a JSON object".to_string()))?;
    let mut nodes = Vec::new();
    let mut warnings = Vec::new();
    for (name, spec) in obj {
        match parse_agg_entry(name, spec)? {
            (Some(node), mut sub_warnings) => {
                nodes.push(node);
                warnings.append(&mut sub_warnings);
            }
            (None, mut sub_warnings) => warnings.append(&mut sub_warnings),
        }
    }
    Ok((nodes, warnings))
}

fn parse_agg_entry(name: &str, spec: &Json) -> Result<(Option<AggNode>, Vec<ParseWarning>)> {
    let obj = spec.as_object().ok_or_else(|| Error::InvalidQuery(format!("aggregation {name} must be an object")))?;
    let type_key = obj.keys().find(|k| !RECOGNISED_SIBLINGS.contains(&k.as_str()));
    let Some(type_key) = type_key else {
        return Ok((None, vec![ParseWarning { name: name.to_string(), reason: "missing aggregation type".to_string() }]));
    };
    let body = &obj[type_key];

    let kind = match type_key.as_str() {
        "terms" => parse_terms(body)?,
        "range" => parse_range(body, false)?,
        "date_range" => parse_range(body, true)?,
        "avg" => AggKind::Avg { field: metric_field(body)? },
        "sum" => AggKind::Sum { field: metric_field(body)? },
        "min" => AggKind::Min { field: metric_field(body)? },
        "max" => AggKind::Max { field: metric_field(body)? },
        "stats" => AggKind::Stats { field: metric_field(body)? },
        "cardinality" => parse_cardinality(body)?,
        "composite" => parse_composite(body)?,
        "filter" => AggKind::FilterBucket { query: parse_query(body)? },
        "nested" => parse_nested_field_bucket(body)?,
        "top_hits" => parse_top_hits(body)?,
        "bucket_script" => parse_bucket_script(body)?,
        "scripted_metric" => parse_scripted_metric(body)?,
        other if KNOWN_AGG_TYPES.contains(&other) => unreachable!("listed in KNOWN_AGG_TYPES but unhandled: {other}"),
        other => {
            return Ok((
                None,
                vec![ParseWarning { name: name.to_string(), reason: format!("unrecognised aggregation type: {other}") }],
            ))
        }
    };

    let (sub_aggs, mut sub_warnings) = match obj.get("aggs").or_else(|| obj.get("aggregations")) {
        Some(sub) => parse_aggs(sub)?,
        None => (Vec::new(), Vec::new()),
    };

    Ok((Some(AggNode { name: name.to_string(), kind, sub_aggs }), {
        sub_warnings.shrink_to_fit();
        sub_warnings
    }))
}

fn metric_field(body: &Json) -> Result<String> {
    body.get("field")
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingField("field".to_string()))
}

fn parse_terms(body: &Json) -> Result<AggKind> {
    let field = metric_field(body)?;
    let size = body.get("size").and_then(Json::as_u64).unwrap_or(10) as usize;
    Ok(AggKind::Terms { field, size })
}

fn parse_cardinality(body: &Json) -> Result<AggKind> {
    let field = metric_field(body)?;
    let precision_threshold = body.get("precision_threshold").and_then(Json::as_f64).unwrap_or(3000.0);
    Ok(AggKind::Cardinality { field, precision_threshold })
}

fn parse_range(body: &Json, date: bool) -> Result<AggKind> {
    let field = metric_field(body)?;
    let raw_ranges = body
        .get("ranges")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::MissingField("ranges".to_string()))?;
    let ranges = raw_ranges
        .iter()
        .map(|r| parse_user_range(r, date))
        .collect::<Result<Vec<_>>>()?;
    Ok(if date { AggKind::DateRange { field, ranges } } else { AggKind::NumericRange { field, ranges } })
}

fn parse_user_range(json: &Json, date: bool) -> Result<UserRange> {
    let obj = json.as_object().ok_or_else(|| Error::InvalidEndpointType("range entry must be an object".to_string()))?;
    let from = range_endpoint(obj.get("from"), date)?;
    let to = range_endpoint(obj.get("to"), date)?;
    let key = obj.get("key").and_then(Json::as_str).map(str::to_string);
    Ok(UserRange { from, to, key })
}

fn range_endpoint(json: Option<&Json>, date: bool) -> Result<Option<f64>> {
    let Some(json) = json else { return Ok(None) };
    if date {
        let s = json.as_str().ok_or_else(|| Error::InvalidEndpointType("date range endpoint must be a string".to_string()))?;
        let dt = try_parse_date(s).ok_or_else(|| Error::InvalidEndpointType(format!("unparseable date: {s}")))?;
        Ok(Some(dt.timestamp_millis() as f64))
    } else {
        Ok(json.as_f64())
    }
}

fn parse_composite(body: &Json) -> Result<AggKind> {
    let sources_json = body
        .get("sources")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::MissingField("sources".to_string()))?;
    let mut sources = Vec::with_capacity(sources_json.len());
    for entry in sources_json {
        let obj = entry.as_object().ok_or_else(|| Error::InvalidQuery("composite source must be an object".to_string()))?;
        let (name, spec) = obj.iter().next().ok_or_else(|| Error::MissingField("composite source".to_string()))?;
        let terms = spec.get("terms");
        let field = terms
            .and_then(|t| t.get("field"))
            .and_then(Json::as_str)
            .ok_or_else(|| Error::MissingField("field".to_string()))?;
        let missing_bucket = terms.and_then(|t| t.get("missing_bucket")).and_then(Json::as_bool).unwrap_or(false);
        sources.push(CompositeSource { name: name.clone(), field: field.to_string(), missing_bucket });
    }
    let size = body.get("size").and_then(Json::as_u64).unwrap_or(10) as usize;
    let after_key = body.get("after").and_then(Json::as_object).map(|m| {
        m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect::<BTreeMap<_, _>>()
    });
    Ok(AggKind::Composite { sources, size, after_key })
}

fn parse_nested_field_bucket(body: &Json) -> Result<AggKind> {
    let path = body.get("path").and_then(Json::as_str).ok_or_else(|| Error::MissingField("path".to_string()))?;
    Ok(AggKind::NestedFieldBucket { path: path.to_string() })
}

fn parse_top_hits(body: &Json) -> Result<AggKind> {
    let size = body.get("size").and_then(Json::as_u64).unwrap_or(3) as usize;
    let sort = body
        .get("sort")
        .and_then(Json::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| entry.as_object().and_then(|o| o.iter().next()))
                .map(|(field, order)| crate::engine::SortField {
                    field: field.clone(),
                    descending: order.as_str() == Some("desc"),
                })
                .collect()
        })
        .unwrap_or_default();
    let source_includes = body
        .get("_source")
        .and_then(Json::as_array)
        .map(|arr| arr.iter().filter_map(Json::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    Ok(AggKind::TopHits(TopHitsSpec { size, sort, source_includes }))
}

fn parse_bucket_script(body: &Json) -> Result<AggKind> {
    let buckets_path = body
        .get("buckets_path")
        .and_then(Json::as_object)
        .ok_or_else(|| Error::MissingField("buckets_path".to_string()))?
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    let script = body
        .get("script")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("script".to_string()))?
        .to_string();
    let gap_policy = match body.get("gap_policy").and_then(Json::as_str) {
        Some("insert_zeros") => GapPolicy::InsertZeros,
        _ => GapPolicy::Skip,
    };
    let format = body.get("format").and_then(Json::as_str).map(str::to_string);
    Ok(AggKind::BucketScript { buckets_path, script, gap_policy, format })
}

fn parse_scripted_metric(body: &Json) -> Result<AggKind> {
    let script_str = |key: &str| -> Result<String> {
        body.get(key).and_then(Json::as_str).map(str::to_string).ok_or_else(|| Error::MissingField(key.to_string()))
    };
    Ok(AggKind::ScriptedMetric {
        init_script: script_str("init_script")?,
        map_script: script_str("map_script")?,
        combine_script: script_str("combine_script")?,
        reduce_script: script_str("reduce_script")?,
        params: body.get("params").cloned().unwrap_or(Json::Null),
    })
}

/// Serialize a plan back to the JSON shape [`parse_aggs`] accepts (spec §4.3
/// round-trip requirement, §8).
pub fn serialize_plan(nodes: &[AggNode]) -> Json {
    let mut out = Map::new();
    for node in nodes {
        out.insert(node.name.clone(), serialize_entry(node));
    }
    Json::Object(out)
}

fn serialize_entry(node: &AggNode) -> Json {
    let mut entry = Map::new();
    let (type_key, body) = serialize_kind(&node.kind);
    entry.insert(type_key.to_string(), body);
    if !node.sub_aggs.is_empty() {
        entry.insert("aggs".to_string(), serialize_plan(&node.sub_aggs));
    }
    Json::Object(entry)
}

fn serialize_kind(kind: &AggKind) -> (&'static str, Json) {
    match kind {
        AggKind::Terms { field, size } => ("terms", serde_json::json!({"field": field, "size": size})),
        AggKind::NumericRange { field, ranges } => ("range", serde_json::json!({"field": field, "ranges": serialize_ranges(ranges, false)})),
        AggKind::DateRange { field, ranges } => ("date_range", serde_json::json!({"field": field, "ranges": serialize_ranges(ranges, true)})),
        AggKind::Avg { field } => ("avg", serde_json::json!({"field": field})),
        AggKind::Sum { field } => ("sum", serde_json::json!({"field": field})),
        AggKind::Min { field } => ("min", serde_json::json!({"field": field})),
        AggKind::Max { field } => ("max", serde_json::json!({"field": field})),
        AggKind::Stats { field } => ("stats", serde_json::json!({"field": field})),
        AggKind::Cardinality { field, precision_threshold } => {
            ("cardinality", serde_json::json!({"field": field, "precision_threshold": precision_threshold}))
        }
        AggKind::Composite { sources, size, after_key } => {
            let sources_json: Vec<Json> = sources
                .iter()
                .map(|s| {
                    let mut terms = serde_json::json!({"field": s.field});
                    if s.missing_bucket {
                        terms["missing_bucket"] = Json::Bool(true);
                    }
                    serde_json::json!({s.name.clone(): {"terms": terms}})
                })
                .collect();
            let mut body = serde_json::json!({"sources": sources_json, "size": size});
            if let Some(after) = after_key {
                let after_json: Map<String, Json> = after.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                body["after"] = Json::Object(after_json);
            }
            ("composite", body)
        }
        AggKind::FilterBucket { query } => ("filter", serialize_query_back(query)),
        AggKind::NestedFieldBucket { path } => ("nested", serde_json::json!({"path": path})),
        AggKind::TopHits(spec) => {
            let sort_json: Vec<Json> = spec
                .sort
                .iter()
                .map(|s| serde_json::json!({s.field.clone(): if s.descending { "desc" } else { "asc" }}))
                .collect();
            ("top_hits", serde_json::json!({"size": spec.size, "sort": sort_json, "_source": spec.source_includes}))
        }
        AggKind::BucketScript { buckets_path, script, gap_policy, format } => {
            let mut body = serde_json::json!({
                "buckets_path": buckets_path,
                "script": script,
                "gap_policy": if *gap_policy == GapPolicy::InsertZeros { "insert_zeros" } else { "skip" },
            });
            if let Some(format) = format {
                body["format"] = Json::String(format.clone());
            }
            ("bucket_script", body)
        }
        AggKind::ScriptedMetric { init_script, map_script, combine_script, reduce_script, params } => (
            "scripted_metric",
            serde_json::json!({
                "init_script": init_script,
                "map_script": map_script,
                "combine_script": combine_script,
                "reduce_script": reduce_script,
                "params": params,
            }),
        ),
    }
}

fn serialize_ranges(ranges: &[UserRange], date: bool) -> Vec<Json> {
    ranges
        .iter()
        .map(|r| {
            let mut obj = Map::new();
            if let Some(from) = r.from {
                obj.insert("from".to_string(), range_endpoint_json(from, date));
            }
            if let Some(to) = r.to {
                obj.insert("to".to_string(), range_endpoint_json(to, date));
            }
            if let Some(key) = &r.key {
                obj.insert("key".to_string(), Json::String(key.clone()));
            }
            Json::Object(obj)
        })
        .collect()
}

fn range_endpoint_json(v: f64, date: bool) -> Json {
    if date {
        let dt = chrono::DateTime::from_timestamp_millis(v as i64).unwrap_or_default();
        Json::String(dt.to_rfc3339())
    } else {
        serde_json::json!(v)
    }
}

/// Reverse mapping for `filter` sub-aggregations: the query node algebra does
/// not retain the exact original JSON shape (e.g. `terms` desugars into a
/// [`QueryNode::Disjunction`] of [`QueryNode::Term`]s), so round-tripping
/// re-derives an equivalent query, not a byte-identical one.
fn serialize_query_back(query: &QueryNode) -> Json {
    match query {
        QueryNode::Term { field, value, boost } => with_boost(serde_json::json!({field.clone(): value.to_json()}), "term", *boost),
        QueryNode::Terms { field, values, boost } => {
            with_boost(serde_json::json!({field.clone(): values.iter().map(Value::to_json).collect::<Vec<_>>()}), "terms", *boost)
        }
        QueryNode::Match { field, query, boost } => with_boost(serde_json::json!({field.clone(): {"query": query}}), "match", *boost),
        QueryNode::MatchPhrase { field, query, boost } => {
            with_boost(serde_json::json!({field.clone(): {"query": query}}), "match_phrase", *boost)
        }
        QueryNode::MatchAll { boost } => with_boost(Json::Object(Map::new()), "match_all", *boost),
        QueryNode::Prefix { field, value, boost } => with_boost(serde_json::json!({field.clone(): value}), "prefix", *boost),
        QueryNode::Wildcard { field, pattern, boost } => with_boost(serde_json::json!({field.clone(): pattern}), "wildcard", *boost),
        QueryNode::Regexp { field, pattern, boost } => with_boost(serde_json::json!({field.clone(): pattern}), "regexp", *boost),
        QueryNode::Fuzzy { field, value, fuzziness, boost } => {
            with_boost(serde_json::json!({field.clone(): {"value": value, "fuzziness": fuzziness}}), "fuzzy", *boost)
        }
        QueryNode::Range { field, range, boost } => {
            let mut spec = Map::new();
            if let Some(v) = &range.gt {
                spec.insert("gt".to_string(), endpoint_json(v));
            }
            if let Some(v) = &range.gte {
                spec.insert("gte".to_string(), endpoint_json(v));
            }
            if let Some(v) = &range.lt {
                spec.insert("lt".to_string(), endpoint_json(v));
            }
            if let Some(v) = &range.lte {
                spec.insert("lte".to_string(), endpoint_json(v));
            }
            with_boost(serde_json::json!({field.clone(): Json::Object(spec)}), "range", *boost)
        }
        QueryNode::Exists { field } => serde_json::json!({"exists": {"field": field}}),
        QueryNode::Ids { values, boost } => with_boost(serde_json::json!({"values": values}), "ids", *boost),
        QueryNode::Bool { must, should, must_not, filter, boost } => {
            let mut body = Map::new();
            body.insert("must".to_string(), Json::Array(must.iter().map(serialize_query_back).collect()));
            body.insert("should".to_string(), Json::Array(should.iter().map(serialize_query_back).collect()));
            body.insert("must_not".to_string(), Json::Array(must_not.iter().map(serialize_query_back).collect()));
            body.insert("filter".to_string(), Json::Array(filter.iter().map(serialize_query_back).collect()));
            with_boost(Json::Object(body), "bool", *boost)
        }
        QueryNode::Conjunction(nodes) => {
            let filter: Vec<Json> = nodes.iter().map(serialize_query_back).collect();
            serde_json::json!({"bool": {"filter": filter}})
        }
        QueryNode::Disjunction(nodes) => {
            let should: Vec<Json> = nodes.iter().map(serialize_query_back).collect();
            serde_json::json!({"bool": {"should": should}})
        }
        QueryNode::Nested { path, query, boost } => {
            with_boost(serde_json::json!({"path": path, "query": serialize_query_back(query)}), "nested", *boost)
        }
        QueryNode::HasChild { type_name, query, boost } => {
            with_boost(serde_json::json!({"type": type_name, "query": serialize_query_back(query)}), "has_child", *boost)
        }
        QueryNode::HasParent { type_name, query, boost } => {
            with_boost(serde_json::json!({"parent_type": type_name, "query": serialize_query_back(query)}), "has_parent", *boost)
        }
        QueryNode::Percolate { field, index, id, boost } => {
            with_boost(serde_json::json!({"field": field, "index": index, "document_id": id}), "percolate", *boost)
        }
    }
}

fn with_boost(mut body: Json, key: &str, boost: f32) -> Json {
    if boost != 1.0 {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("boost".to_string(), serde_json::json!(boost));
        }
    }
    serde_json::json!({key: body})
}

fn endpoint_json(endpoint: &crate::query::ast::RangeEndpoint) -> Json {
    use crate::query::ast::RangeEndpoint;
    match endpoint {
        RangeEndpoint::Numeric(v) => serde_json::json!(v),
        RangeEndpoint::Date(dt) => Json::String(dt.to_rfc3339()),
        RangeEndpoint::String(s) => Json::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_terms_with_default_size() {
        let (nodes, warnings) = parse_aggs(&json!({"categories": {"terms": {"field": "category"}}})).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(nodes.len(), 1);
        match &nodes[0].kind {
            AggKind::Terms { field, size } => {
                assert_eq!(field, "category");
                assert_eq!(*size, 10);
            }
            other => panic!("expected terms, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_a_warning_not_an_error() {
        let (nodes, warnings) = parse_aggs(&json!({"weird": {"frobnicate": {"field": "x"}}})).unwrap();
        assert!(nodes.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn top_hits_defaults_size_to_three() {
        let (nodes, _) = parse_aggs(&json!({"sample": {"top_hits": {}}})).unwrap();
        match &nodes[0].kind {
            AggKind::TopHits(spec) => assert_eq!(spec.size, 3),
            other => panic!("expected top_hits, got {other:?}"),
        }
    }

    #[test]
    fn sub_aggregations_attach_to_parent() {
        let (nodes, _) = parse_aggs(&json!({
            "categories": {"terms": {"field": "category"}, "aggs": {"avg_price": {"avg": {"field": "price"}}}}
        }))
        .unwrap();
        assert_eq!(nodes[0].sub_aggs.len(), 1);
        assert_eq!(nodes[0].sub_aggs[0].name, "avg_price");
    }

    #[test]
    fn composite_preserves_source_order() {
        let (nodes, _) = parse_aggs(&json!({
            "by_cat_and_brand": {"composite": {"sources": [
                {"cat": {"terms": {"field": "category"}}},
                {"brand": {"terms": {"field": "brand"}}}
            ]}}
        }))
        .unwrap();
        match &nodes[0].kind {
            AggKind::Composite { sources, .. } => {
                assert_eq!(sources[0].name, "cat");
                assert_eq!(sources[1].name, "brand");
            }
            other => panic!("expected composite, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_preserves_filter_bucket_with_bool_range_query() {
        let original = json!({
            "expensive_electronics": {
                "filter": {
                    "bool": {
                        "must": [{"term": {"category": "electronics"}}],
                        "filter": [{"range": {"price": {"gte": 500.0}}}]
                    }
                }
            }
        });
        let (nodes, _) = parse_aggs(&original).unwrap();
        let serialized = serialize_plan(&nodes);
        let (reparsed, _) = parse_aggs(&serialized).unwrap();
        match (&nodes[0].kind, &reparsed[0].kind) {
            (AggKind::FilterBucket { query: a }, AggKind::FilterBucket { query: b }) => assert_eq!(a, b),
            other => panic!("expected filter bucket on both sides, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_preserves_terms_shape() {
        let original = json!({"categories": {"terms": {"field": "category", "size": 10}}});
        let (nodes, _) = parse_aggs(&original).unwrap();
        let serialized = serialize_plan(&nodes);
        assert_eq!(serialized, original);
    }

    #[test]
    fn cardinality_accepts_float_precision_threshold() {
        let (nodes, _) = parse_aggs(&json!({"uniq": {"cardinality": {"field": "sku", "precision_threshold": 1000.5}}})).unwrap();
        match &nodes[0].kind {
            AggKind::Cardinality { precision_threshold, .. } => assert_eq!(*precision_threshold, 1000.5),
            other => panic!("expected cardinality, got {other:?}"),
        }
    }
}
