//! JSON → [`QueryNode`] parser (C1).

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::Value;

use super::ast::{QueryNode, Range, RangeEndpoint};

/// Parse one query DSL object into a query node tree.
pub fn parse_query(json: &Json) -> Result<QueryNode> {
    let obj = json
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("query must be a JSON object".to_string()))?;
    if obj.len() != 1 {
        return Err(Error::InvalidQuery(
            "query object must have exactly one top-level key".to_string(),
        ));
    }
    let (key, body) = obj.iter().next().unwrap();
    match key.as_str() {
        "term" => parse_term(body),
        "terms" => parse_terms(body),
        "match" => parse_match(body, false),
        "match_phrase" => parse_match(body, true),
        "match_all" => Ok(QueryNode::MatchAll { boost: read_boost(body) }),
        "prefix" => parse_value_field(body, |field, value, boost| QueryNode::Prefix { field, value, boost }),
        "wildcard" => parse_value_field(body, |field, pattern, boost| QueryNode::Wildcard { field, pattern, boost }),
        "regexp" => parse_value_field(body, |field, pattern, boost| QueryNode::Regexp { field, pattern, boost }),
        "fuzzy" => parse_fuzzy(body),
        "range" => parse_range(body),
        "exists" => parse_exists(body),
        "ids" => parse_ids(body),
        "bool" => parse_bool(body),
        "nested" => parse_nested(body),
        "has_child" => parse_has_child(body),
        "has_parent" => parse_has_parent(body),
        "percolate" => parse_percolate(body),
        other => Err(Error::UnknownQueryType(other.to_string())),
    }
}

fn read_boost(body: &Json) -> f32 {
    body.as_object()
        .and_then(|o| o.get("boost"))
        .and_then(Json::as_f64)
        .map(|b| b as f32)
        .unwrap_or(1.0)
}

fn single_field(body: &Json) -> Result<(&String, &Json)> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("expected a field object".to_string()))?;
    obj.iter()
        .next()
        .ok_or_else(|| Error::MissingField("field".to_string()))
}

fn parse_term(body: &Json) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let (value_json, boost) = unwrap_value_and_boost(spec);
    Ok(QueryNode::Term {
        field: field.clone(),
        value: Value::from_json(value_json),
        boost,
    })
}

fn parse_terms(body: &Json) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let values = spec
        .as_array()
        .ok_or_else(|| Error::InvalidQuery("terms value must be an array".to_string()))?;
    let nodes: Vec<QueryNode> = values
        .iter()
        .map(|v| QueryNode::Term {
            field: field.clone(),
            value: Value::from_json(v),
            boost: 1.0,
        })
        .collect();
    Ok(QueryNode::Disjunction(nodes))
}

fn parse_match(body: &Json, phrase: bool) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let (value_json, boost) = unwrap_value_and_boost_keyed(spec, "query");
    let text = value_json
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value_json.to_string());
    Ok(if phrase {
        QueryNode::MatchPhrase { field: field.clone(), query: text, boost }
    } else {
        QueryNode::Match { field: field.clone(), query: text, boost }
    })
}

fn parse_value_field(
    body: &Json,
    build: impl Fn(String, String, f32) -> QueryNode,
) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let (value_json, boost) = unwrap_value_and_boost(spec);
    let text = value_json
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value_json.to_string());
    Ok(build(field.clone(), text, boost))
}

fn parse_fuzzy(body: &Json) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let (value_json, boost) = unwrap_value_and_boost(spec);
    let fuzziness = spec
        .as_object()
        .and_then(|o| o.get("fuzziness"))
        .and_then(Json::as_u64)
        .unwrap_or(2) as u32;
    let text = value_json
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value_json.to_string());
    Ok(QueryNode::Fuzzy { field: field.clone(), value: text, fuzziness, boost })
}

/// `{"value": ..., "boost": ...}` or a bare scalar.
fn unwrap_value_and_boost(spec: &Json) -> (&Json, f32) {
    unwrap_value_and_boost_keyed(spec, "value")
}

fn unwrap_value_and_boost_keyed<'a>(spec: &'a Json, key: &str) -> (&'a Json, f32) {
    if let Some(obj) = spec.as_object() {
        if let Some(v) = obj.get(key) {
            let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
            return (v, boost);
        }
    }
    (spec, 1.0)
}

fn parse_endpoint(json: &Json) -> RangeEndpoint {
    match json {
        Json::Number(n) => RangeEndpoint::Numeric(n.as_f64().unwrap_or(0.0)),
        Json::String(s) => {
            if let Some(dt) = try_parse_date(s) {
                RangeEndpoint::Date(dt)
            } else if let Ok(f) = s.parse::<f64>() {
                RangeEndpoint::Numeric(f)
            } else {
                RangeEndpoint::String(s.clone())
            }
        }
        other => RangeEndpoint::String(other.to_string()),
    }
}

/// Tries RFC3339 first, then a bare `YYYY-MM-DD` date (spec §4.1).
pub(crate) fn try_parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    None
}

fn parse_range(body: &Json) -> Result<QueryNode> {
    let (field, spec) = single_field(body)?;
    let obj = spec
        .as_object()
        .ok_or_else(|| Error::InvalidEndpointType("range spec must be an object".to_string()))?;
    let mut range = Range::default();
    for (endpoint_key, slot) in [
        ("gt", &mut range.gt),
        ("gte", &mut range.gte),
        ("lt", &mut range.lt),
        ("lte", &mut range.lte),
    ] {
        if let Some(v) = obj.get(endpoint_key) {
            *slot = Some(parse_endpoint(v));
        }
    }
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::Range { field: field.clone(), range, boost })
}

fn parse_exists(body: &Json) -> Result<QueryNode> {
    let field = body
        .as_object()
        .and_then(|o| o.get("field"))
        .and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("field".to_string()))?;
    Ok(QueryNode::Exists { field: field.to_string() })
}

fn parse_ids(body: &Json) -> Result<QueryNode> {
    let obj = body.as_object().ok_or_else(|| Error::MissingField("values".to_string()))?;
    let values = obj
        .get("values")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::MissingField("values".to_string()))?
        .iter()
        .filter_map(Json::as_str)
        .map(str::to_string)
        .collect();
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::Ids { values, boost })
}

fn parse_clause_list(obj: &serde_json::Map<String, Json>, key: &str) -> Result<Vec<QueryNode>> {
    match obj.get(key) {
        None => Ok(Vec::new()),
        Some(Json::Array(items)) => items.iter().map(parse_query).collect(),
        Some(single) => Ok(vec![parse_query(single)?]),
    }
}

fn parse_bool(body: &Json) -> Result<QueryNode> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("bool query must be an object".to_string()))?;
    let must = parse_clause_list(obj, "must")?;
    let should = parse_clause_list(obj, "should")?;
    let must_not = parse_clause_list(obj, "must_not")?;
    let filter = parse_clause_list(obj, "filter")?;
    if must.is_empty() && should.is_empty() && must_not.is_empty() && filter.is_empty() {
        return Err(Error::EmptyBool);
    }
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::Bool { must, should, must_not, filter, boost })
}

fn parse_nested(body: &Json) -> Result<QueryNode> {
    let obj = body.as_object().ok_or_else(|| Error::MissingField("path".to_string()))?;
    let path = obj
        .get("path")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("path".to_string()))?;
    let inner = obj.get("query").ok_or_else(|| Error::MissingField("query".to_string()))?;
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::Nested { path: path.to_string(), query: Box::new(parse_query(inner)?), boost })
}

fn parse_has_child(body: &Json) -> Result<QueryNode> {
    let obj = body.as_object().ok_or_else(|| Error::MissingField("type".to_string()))?;
    let type_name = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("type".to_string()))?;
    let inner = obj.get("query").ok_or_else(|| Error::MissingField("query".to_string()))?;
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::HasChild { type_name: type_name.to_string(), query: Box::new(parse_query(inner)?), boost })
}

fn parse_has_parent(body: &Json) -> Result<QueryNode> {
    let obj = body.as_object().ok_or_else(|| Error::MissingField("parent_type".to_string()))?;
    let type_name = obj
        .get("parent_type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("parent_type".to_string()))?;
    let inner = obj.get("query").ok_or_else(|| Error::MissingField("query".to_string()))?;
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::HasParent { type_name: type_name.to_string(), query: Box::new(parse_query(inner)?), boost })
}

fn parse_percolate(body: &Json) -> Result<QueryNode> {
    let obj = body.as_object().ok_or_else(|| Error::MissingField("field".to_string()))?;
    let field = obj.get("field").and_then(Json::as_str).ok_or_else(|| Error::MissingField("field".to_string()))?;
    let index = obj.get("index").and_then(Json::as_str).ok_or_else(|| Error::MissingField("index".to_string()))?;
    let id = obj.get("document_id").or_else(|| obj.get("id")).and_then(Json::as_str)
        .ok_or_else(|| Error::MissingField("document_id".to_string()))?;
    let boost = obj.get("boost").and_then(Json::as_f64).map(|b| b as f32).unwrap_or(1.0);
    Ok(QueryNode::Percolate { field: field.to_string(), index: index.to_string(), id: id.to_string(), boost })
}
