//! Search Executor (C4, spec §4.4).

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::{Map, Value as Json};

use crate::agg::plan::{AggKind, AggNode};
use crate::agg::AggExecutor;
use crate::engine::{EngineSearchRequest, SearchEngine, SortField};
use crate::error::{Error, Result};
use crate::query::ast::QueryNode;
use crate::script::{self, Context as ScriptContext, Script};
use crate::value::{Document, Value};

/// Raises the engine's effective result-set size so metric aggregations can
/// sweep documents even when the caller asked for `size = 0` (spec §4.4).
const METRIC_SWEEP_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: QueryNode,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortField>,
    pub search_after: Option<Vec<Value>>,
    pub source_includes: Vec<String>,
    pub script_fields: BTreeMap<String, Json>,
    pub highlight_fields: Vec<String>,
    pub highlight_style: Option<String>,
    pub aggs: Vec<AggNode>,
    pub post_filter: Option<QueryNode>,
    pub min_score: Option<f32>,
    pub explain: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest {
            query: QueryNode::match_all(),
            from: 0,
            size: 10,
            sort: Vec::new(),
            search_after: None,
            source_includes: Vec::new(),
            script_fields: BTreeMap::new(),
            highlight_fields: Vec::new(),
            highlight_style: None,
            aggs: Vec::new(),
            post_filter: None,
            min_score: None,
            explain: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HitResult {
    pub id: String,
    pub score: f32,
    pub source: Option<Json>,
    pub sort: Vec<Value>,
    pub highlight: Option<Map<String, Json>>,
    pub explanation: Option<Json>,
    pub script_fields: Option<Map<String, Json>>,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<HitResult>,
    pub total: u64,
    pub max_score: f32,
    pub aggregations: Option<Map<String, Json>>,
    pub took_ms: u64,
}

pub fn execute_search(index: &str, engine: &dyn SearchEngine, req: &SearchRequest) -> Result<SearchOutcome> {
    if let Some(after) = &req.search_after {
        if after.len() != req.sort.len() {
            return Err(Error::BadRequest("search_after length must match sort length".to_string()));
        }
        if req.from != 0 {
            return Err(Error::BadRequest("search_after cannot be combined with from != 0".to_string()));
        }
    }

    let mut sort = req.sort.clone();
    if req.search_after.is_some() && sort.is_empty() {
        sort.push(SortField::asc("_id"));
    }

    let has_metric_agg = any_metric_agg(&req.aggs);
    let effective_size = if req.size == 0 && has_metric_agg { METRIC_SWEEP_SIZE } else { req.size };

    let engine_query = match &req.post_filter {
        Some(post_filter) => req.query.clone().and(post_filter.clone()),
        None => req.query.clone(),
    };

    let engine_req = EngineSearchRequest {
        query: engine_query,
        from: req.from,
        size: effective_size,
        sort,
        search_after: req.search_after.clone(),
        fields_projection: None,
    };

    let start = Instant::now();
    let result = engine.search(index, &engine_req)?;
    let took_ms = start.elapsed().as_millis() as u64;

    let mut hits = Vec::new();
    for engine_hit in &result.hits {
        if let Some(min_score) = req.min_score {
            if engine_hit.score < min_score {
                continue;
            }
        }
        let doc = engine.fetch_document(index, &engine_hit.id)?;
        let source = doc.as_ref().map(|d| d.filtered_source(&req.source_includes));
        let highlight = build_highlight(doc.as_ref(), &req.highlight_fields, &req.query, req.highlight_style.as_deref());
        let script_fields = build_script_fields(doc.as_ref(), engine_hit.score, &req.script_fields)?;
        let explanation = req.explain.then(|| explain_hit(engine_hit.score));
        hits.push(HitResult {
            id: engine_hit.id.clone(),
            score: engine_hit.score,
            source,
            sort: engine_hit.sort.clone(),
            highlight,
            explanation,
            script_fields,
        });
    }

    let aggregations = if req.aggs.is_empty() {
        None
    } else {
        let executor = AggExecutor::new(index, engine);
        Some(executor.execute(&req.aggs, &req.query)?)
    };

    let max_score = hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);

    Ok(SearchOutcome { hits, total: result.total, max_score, aggregations, took_ms })
}

fn any_metric_agg(nodes: &[AggNode]) -> bool {
    nodes.iter().any(|n| {
        matches!(n.kind, AggKind::Avg { .. } | AggKind::Sum { .. } | AggKind::Min { .. } | AggKind::Max { .. } | AggKind::Stats { .. } | AggKind::Cardinality { .. })
            || any_metric_agg(&n.sub_aggs)
    })
}

fn build_highlight(doc: Option<&Document>, fields: &[String], query: &QueryNode, style: Option<&str>) -> Option<Map<String, Json>> {
    if fields.is_empty() {
        return None;
    }
    let doc = doc?;
    let needles = query_terms(query);
    if needles.is_empty() {
        return None;
    }
    let tag = style.unwrap_or("em");
    let mut out = Map::new();
    for field in fields {
        let Some(value) = doc.get(field) else { continue };
        let text = value.to_term_string();
        let highlighted = highlight_text(&text, &needles, tag);
        if highlighted != text {
            out.insert(field.clone(), Json::Array(vec![Json::String(highlighted)]));
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn query_terms(query: &QueryNode) -> Vec<String> {
    match query {
        QueryNode::Match { query, .. } | QueryNode::MatchPhrase { query, .. } => query.split_whitespace().map(str::to_lowercase).collect(),
        QueryNode::Term { value, .. } => vec![value.to_term_string().to_lowercase()],
        QueryNode::Bool { must, filter, .. } => must.iter().chain(filter.iter()).flat_map(query_terms).collect(),
        QueryNode::Conjunction(items) | QueryNode::Disjunction(items) => items.iter().flat_map(query_terms).collect(),
        _ => Vec::new(),
    }
}

fn highlight_text(text: &str, needles: &[String], tag: &str) -> String {
    let mut result = String::new();
    for word in text.split_inclusive(' ') {
        let bare = word.trim_end();
        if needles.iter().any(|n| bare.to_lowercase() == *n) {
            result.push_str(&format!("<{tag}>{bare}</{tag}>"));
            result.push_str(&word[bare.len()..]);
        } else {
            result.push_str(word);
        }
    }
    result
}

fn build_script_fields(doc: Option<&Document>, score: f32, script_fields: &BTreeMap<String, Json>) -> Result<Option<Map<String, Json>>> {
    if script_fields.is_empty() {
        return Ok(None);
    }
    let mut out = Map::new();
    for (name, spec) in script_fields {
        let script = Script::parse(spec)?;
        let ctx = ScriptContext {
            doc: doc.cloned(),
            source: doc.map(|d| d.source_json()),
            score,
            params: spec.get("params").cloned().unwrap_or(Json::Null),
            bindings: BTreeMap::new(),
        };
        let value = script::execute(&script, &ctx)?;
        out.insert(name.clone(), Json::Array(vec![value.to_json()]));
    }
    Ok(Some(out))
}

fn explain_hit(score: f32) -> Json {
    serde_json::json!({"value": score, "description": "score from query evaluation", "details": []})
}
