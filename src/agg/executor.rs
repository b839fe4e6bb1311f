//! Aggregation Executor (C5, spec §4.5).

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value as Json};

use crate::engine::{EngineSearchRequest, RangeSpec, SearchEngine, SortField};
use crate::error::Result;
use crate::query::ast::{Range, RangeEndpoint, QueryNode};
use crate::script::{self, Context as ScriptContext, Script};
use crate::value::Value;

use super::facet_decode::decode_facet_term;
use super::plan::{AggKind, AggNode, GapPolicy, UserRange};

/// Cap for metric-aggregation document sweeps (spec §4.4/§4.5 "size=0 with
/// metric aggs ... up to 10 000 documents").
const METRIC_SWEEP_SIZE: usize = 10_000;
/// Composite aggregation batch size and hard ceiling (spec §4.5).
const COMPOSITE_BATCH: usize = 10_000;
const COMPOSITE_CEILING: usize = 1_000_000;

pub struct AggExecutor<'a> {
    pub index: &'a str,
    pub engine: &'a dyn SearchEngine,
}

impl<'a> AggExecutor<'a> {
    pub fn new(index: &'a str, engine: &'a dyn SearchEngine) -> Self {
        AggExecutor { index, engine }
    }

    pub fn execute(&self, nodes: &[AggNode], base_query: &QueryNode) -> Result<Map<String, Json>> {
        let mut out = Map::new();
        for node in nodes {
            let value = match &node.kind {
                AggKind::Terms { field, size } => self.terms(node, field, *size, base_query)?,
                AggKind::NumericRange { field, ranges } => self.range(node, field, ranges, base_query, false)?,
                AggKind::DateRange { field, ranges } => self.range(node, field, ranges, base_query, true)?,
                AggKind::Avg { field } => self.metric_single(field, base_query, Metric::Avg)?,
                AggKind::Sum { field } => self.metric_single(field, base_query, Metric::Sum)?,
                AggKind::Min { field } => self.metric_single(field, base_query, Metric::Min)?,
                AggKind::Max { field } => self.metric_single(field, base_query, Metric::Max)?,
                AggKind::Stats { field } => self.stats(field, base_query)?,
                AggKind::Cardinality { field, precision_threshold } => self.cardinality(field, base_query, *precision_threshold)?,
                AggKind::Composite { sources, size, after_key } => self.composite(node, sources, *size, after_key, base_query)?,
                AggKind::FilterBucket { query } => self.filter_bucket(node, query, base_query)?,
                AggKind::NestedFieldBucket { path } => self.nested_field_bucket(node, path, base_query)?,
                AggKind::TopHits(spec) => self.top_hits(spec, base_query)?,
                AggKind::BucketScript { buckets_path, script, gap_policy, format } => {
                    match self.bucket_script(&out, buckets_path, script, *gap_policy, format.as_deref())? {
                        Some(v) => v,
                        None => continue,
                    }
                }
                AggKind::ScriptedMetric { init_script, map_script, combine_script, reduce_script, params } => {
                    self.scripted_metric(base_query, init_script, map_script, combine_script, reduce_script, params)?
                }
            };
            out.insert(node.name.clone(), value);
        }
        Ok(out)
    }

    fn sub_query_for_term(field: &str, value: &Value, base: &QueryNode) -> QueryNode {
        let term = match value {
            Value::Bool(b) => QueryNode::Term { field: field.to_string(), value: Value::String(b.to_string()), boost: 1.0 },
            Value::Int(_) | Value::Float(_) => QueryNode::Disjunction(vec![
                QueryNode::Range {
                    field: field.to_string(),
                    range: Range { gte: Some(RangeEndpoint::Numeric(value.as_f64().unwrap_or(0.0))), lte: Some(RangeEndpoint::Numeric(value.as_f64().unwrap_or(0.0))), ..Default::default() },
                    boost: 1.0,
                },
                QueryNode::Term { field: field.to_string(), value: Value::String(value.to_term_string()), boost: 1.0 },
            ]),
            other => QueryNode::Term { field: field.to_string(), value: other.clone(), boost: 1.0 },
        };
        base.clone().and(term)
    }

    fn terms(&self, node: &AggNode, field: &str, size: usize, base_query: &QueryNode) -> Result<Json> {
        let entries = self.engine.facet_terms(self.index, field, base_query, size)?;
        let mut buckets = Vec::new();
        for entry in entries {
            let Some(value) = decode_facet_term(&entry.term_bytes) else { continue };
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), value.to_json());
            bucket.insert("doc_count".to_string(), Json::from(entry.count));
            if !node.sub_aggs.is_empty() {
                let sub_query = Self::sub_query_for_term(field, &value, base_query);
                let sub = self.execute(&node.sub_aggs, &sub_query)?;
                bucket.extend(sub);
            }
            buckets.push(Json::Object(bucket));
        }
        Ok(serde_json::json!({"buckets": buckets}))
    }

    fn range(&self, node: &AggNode, field: &str, ranges: &[UserRange], base_query: &QueryNode, date: bool) -> Result<Json> {
        let specs: Vec<RangeSpec> = ranges.iter().map(|r| RangeSpec { from: r.from, to: r.to, key: r.key.clone() }).collect();
        let counts = self.engine.facet_ranges(self.index, field, base_query, &specs)?;
        let mut buckets = Vec::new();
        for (user_range, count) in ranges.iter().zip(counts) {
            let key = user_range.key.clone().unwrap_or_else(|| default_range_key(user_range.from, user_range.to, date));
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), Json::String(key));
            if let Some(from) = user_range.from {
                bucket.insert("from".to_string(), serde_json::json!(from));
            }
            if let Some(to) = user_range.to {
                bucket.insert("to".to_string(), serde_json::json!(to));
            }
            bucket.insert("doc_count".to_string(), Json::from(count.count));
            if !node.sub_aggs.is_empty() {
                let range_query = QueryNode::Range {
                    field: field.to_string(),
                    range: Range {
                        gte: user_range.from.map(RangeEndpoint::Numeric),
                        lt: user_range.to.map(RangeEndpoint::Numeric),
                        ..Default::default()
                    },
                    boost: 1.0,
                };
                let sub_query = base_query.clone().and(range_query);
                let sub = self.execute(&node.sub_aggs, &sub_query)?;
                bucket.extend(sub);
            }
            buckets.push(Json::Object(bucket));
        }
        Ok(serde_json::json!({"buckets": buckets}))
    }

    fn sweep_field(&self, field: &str, base_query: &QueryNode) -> Result<Vec<Value>> {
        let req = EngineSearchRequest {
            query: base_query.clone(),
            from: 0,
            size: METRIC_SWEEP_SIZE,
            sort: Vec::new(),
            search_after: None,
            fields_projection: Some(vec![field.to_string()]),
        };
        let result = self.engine.search(self.index, &req)?;
        Ok(result
            .hits
            .into_iter()
            .filter_map(|hit| hit.fields.and_then(|doc| doc.get(field).cloned()))
            .filter(|v| !v.is_null())
            .collect())
    }

    fn metric_single(&self, field: &str, base_query: &QueryNode, metric: Metric) -> Result<Json> {
        let values: Vec<f64> = self.sweep_field(field, base_query)?.iter().filter_map(Value::as_f64).collect();
        let value = if values.is_empty() {
            None
        } else {
            Some(match metric {
                Metric::Avg => values.iter().sum::<f64>() / values.len() as f64,
                Metric::Sum => values.iter().sum::<f64>(),
                Metric::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                Metric::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            })
        };
        Ok(serde_json::json!({"value": value}))
    }

    fn stats(&self, field: &str, base_query: &QueryNode) -> Result<Json> {
        let values: Vec<f64> = self.sweep_field(field, base_query)?.iter().filter_map(Value::as_f64).collect();
        let count = values.len();
        let (min, max, avg, sum) = if values.is_empty() {
            (None, None, None, 0.0)
        } else {
            let sum: f64 = values.iter().sum();
            (
                values.iter().cloned().fold(f64::INFINITY, f64::min).into(),
                values.iter().cloned().fold(f64::NEG_INFINITY, f64::max).into(),
                Some(sum / count as f64),
                sum,
            )
        };
        Ok(serde_json::json!({"count": count, "min": min, "max": max, "avg": avg, "sum": sum}))
    }

    fn cardinality(&self, field: &str, base_query: &QueryNode, precision_threshold: f64) -> Result<Json> {
        let values = self.sweep_field(field, base_query)?;
        let estimate = estimate_cardinality(values.iter().map(Value::to_term_string), precision_threshold);
        Ok(serde_json::json!({"value": estimate}))
    }

    fn composite(
        &self,
        node: &AggNode,
        sources: &[super::plan::CompositeSource],
        size: usize,
        after_key: &Option<BTreeMap<String, Value>>,
        base_query: &QueryNode,
    ) -> Result<Json> {
        let fields: Vec<String> = sources.iter().map(|s| s.field.clone()).collect();
        let mut tallies: BTreeMap<Vec<String>, (Vec<Value>, u64)> = BTreeMap::new();

        let mut from = 0usize;
        loop {
            if from >= COMPOSITE_CEILING {
                break;
            }
            let req = EngineSearchRequest {
                query: base_query.clone(),
                from,
                size: COMPOSITE_BATCH,
                sort: Vec::new(),
                search_after: None,
                fields_projection: Some(fields.clone()),
            };
            let result = self.engine.search(self.index, &req)?;
            if result.hits.is_empty() {
                break;
            }
            let batch_len = result.hits.len();
            for hit in result.hits {
                let Some(doc) = hit.fields else { continue };
                let tuple: Option<Vec<Value>> = sources
                    .iter()
                    .map(|s| match doc.get(&s.field) {
                        Some(v) => Some(v.clone()),
                        None if s.missing_bucket => Some(Value::Null),
                        None => None,
                    })
                    .collect();
                let Some(tuple) = tuple else { continue };
                let key: Vec<String> = tuple.iter().map(Value::to_term_string).collect();
                tallies.entry(key).or_insert_with(|| (tuple, 0)).1 += 1;
            }
            if batch_len < COMPOSITE_BATCH {
                break;
            }
            from += COMPOSITE_BATCH;
        }

        let mut entries: Vec<(Vec<Value>, u64)> = tallies.into_values().collect();
        entries.sort_by(|a, b| compare_tuples(&a.0, &b.0));

        if let Some(after) = after_key {
            let after_tuple: Vec<Value> = sources.iter().map(|s| after.get(&s.name).cloned().unwrap_or(Value::Null)).collect();
            entries.retain(|(tuple, _)| compare_tuples(tuple, &after_tuple) == std::cmp::Ordering::Greater);
        }

        entries.truncate(size);

        let mut buckets = Vec::new();
        let mut last_key: Option<Map<String, Json>> = None;
        for (tuple, count) in &entries {
            let mut key = Map::new();
            for (source, value) in sources.iter().zip(tuple.iter()) {
                key.insert(source.name.clone(), value.to_json());
            }
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), Json::Object(key.clone()));
            bucket.insert("doc_count".to_string(), Json::from(*count));
            if !node.sub_aggs.is_empty() {
                let mut sub_query = base_query.clone();
                for (source, value) in sources.iter().zip(tuple.iter()) {
                    sub_query = Self::sub_query_for_term(&source.field, value, &sub_query);
                }
                let sub = self.execute(&node.sub_aggs, &sub_query)?;
                bucket.extend(sub);
            }
            buckets.push(Json::Object(bucket));
            last_key = Some(key);
        }

        let mut response = serde_json::json!({"buckets": buckets});
        if let Some(last_key) = last_key {
            response["after_key"] = Json::Object(last_key);
        }
        Ok(response)
    }

    fn filter_bucket(&self, node: &AggNode, filter: &QueryNode, base_query: &QueryNode) -> Result<Json> {
        let conjoined = base_query.clone().and(filter.clone());
        let doc_count = self.engine.count(self.index, &conjoined)?;
        let mut bucket = Map::new();
        bucket.insert("doc_count".to_string(), Json::from(doc_count));
        let sub = self.execute(&node.sub_aggs, &conjoined)?;
        bucket.extend(sub);
        Ok(Json::Object(bucket))
    }

    fn nested_field_bucket(&self, node: &AggNode, path: &str, base_query: &QueryNode) -> Result<Json> {
        let nested = QueryNode::Nested { path: path.to_string(), query: Box::new(QueryNode::match_all()), boost: 1.0 };
        let conjoined = base_query.clone().and(nested);
        let doc_count = self.engine.count(self.index, &conjoined)?;
        let mut bucket = Map::new();
        bucket.insert("doc_count".to_string(), Json::from(doc_count));
        let sub = self.execute(&node.sub_aggs, &conjoined)?;
        bucket.extend(sub);
        Ok(Json::Object(bucket))
    }

    fn top_hits(&self, spec: &super::plan::TopHitsSpec, base_query: &QueryNode) -> Result<Json> {
        let sort: Vec<SortField> = spec.sort.iter().map(|s| SortField { field: s.field.clone(), descending: s.descending }).collect();
        let req = EngineSearchRequest { query: base_query.clone(), from: 0, size: spec.size, sort, search_after: None, fields_projection: None };
        let result = self.engine.search(self.index, &req)?;
        let mut hits = Vec::new();
        for hit in &result.hits {
            let source = self
                .engine
                .fetch_document(self.index, &hit.id)?
                .map(|doc| doc.filtered_source(&spec.source_includes))
                .unwrap_or(Json::Null);
            hits.push(serde_json::json!({"_index": self.index, "_id": hit.id, "_score": hit.score, "_source": source}));
        }
        let max_score = result.hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);
        Ok(serde_json::json!({
            "hits": {"total": {"value": result.total, "relation": "eq"}, "max_score": max_score, "hits": hits}
        }))
    }

    fn bucket_script(
        &self,
        siblings: &Map<String, Json>,
        buckets_path: &BTreeMap<String, String>,
        script_source: &str,
        gap_policy: GapPolicy,
        format: Option<&str>,
    ) -> Result<Option<Json>> {
        let mut ctx = ScriptContext::default();
        for (name, path) in buckets_path {
            let value = siblings.get(path).and_then(|v| v.get("value")).and_then(Json::as_f64);
            match value {
                Some(v) => ctx = ctx.with_binding(name, Value::Float(v)),
                None => match gap_policy {
                    GapPolicy::Skip => return Ok(None),
                    GapPolicy::InsertZeros => ctx = ctx.with_binding(name, Value::Float(0.0)),
                },
            }
        }
        let script = Script::parse(&serde_json::json!(script_source))?;
        let result = script::execute(&script, &ctx)?;
        let formatted = match (result.as_f64(), format) {
            (Some(f), Some(fmt)) => Json::String(format_number(f, fmt)),
            _ => result.to_json(),
        };
        Ok(Some(serde_json::json!({"value": formatted})))
    }

    fn scripted_metric(
        &self,
        base_query: &QueryNode,
        init_script: &str,
        map_script: &str,
        combine_script: &str,
        reduce_script: &str,
        params: &Json,
    ) -> Result<Json> {
        let init = Script::parse(&serde_json::json!(init_script))?;
        let map = Script::parse(&serde_json::json!(map_script))?;
        let combine = Script::parse(&serde_json::json!(combine_script))?;
        let reduce = Script::parse(&serde_json::json!(reduce_script))?;

        let base_ctx = ScriptContext { params: params.clone(), ..Default::default() };
        let init_state = script::execute(&init, &base_ctx)?;

        let req = EngineSearchRequest { query: base_query.clone(), from: 0, size: METRIC_SWEEP_SIZE, sort: Vec::new(), search_after: None, fields_projection: None };
        let result = self.engine.search(self.index, &req)?;
        let mut per_doc = Vec::new();
        for hit in &result.hits {
            let doc = self.engine.fetch_document(self.index, &hit.id)?;
            let ctx = ScriptContext { doc: doc.clone(), source: doc.map(|d| d.source_json()), score: hit.score, params: params.clone(), bindings: BTreeMap::new() }
                .with_binding("state", init_state.clone());
            per_doc.push(script::execute(&map, &ctx)?);
        }

        let combine_ctx = ScriptContext { params: params.clone(), ..Default::default() }.with_binding("states", Value::List(per_doc));
        let combined = script::execute(&combine, &combine_ctx)?;

        let reduce_ctx = ScriptContext { params: params.clone(), ..Default::default() }.with_binding("states", Value::List(vec![combined]));
        let final_value = script::execute(&reduce, &reduce_ctx)?;
        Ok(serde_json::json!({"value": final_value.to_json()}))
    }
}

#[derive(Clone, Copy)]
enum Metric {
    Avg,
    Sum,
    Min,
    Max,
}

fn default_range_key(from: Option<f64>, to: Option<f64>, _date: bool) -> String {
    match (from, to) {
        (Some(f), Some(t)) => format!("{f}-{t}"),
        (Some(f), None) => format!("{f}+"),
        (None, Some(t)) => format!("*-{t}"),
        (None, None) => "*".to_string(),
    }
}

fn compare_tuples(a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.cmp_canonical(y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn estimate_cardinality(values: impl Iterator<Item = String>, precision_threshold: f64) -> u64 {
    let m = (precision_threshold.max(16.0) as usize).next_power_of_two().min(65_536);
    let mut bits = vec![false; m];
    let mut n = 0u64;
    for v in values {
        n += 1;
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % m;
        bits[idx] = true;
    }
    let zero = bits.iter().filter(|b| !**b).count();
    if zero == 0 {
        return n;
    }
    let estimate = (m as f64) * ((m as f64) / (zero as f64)).ln();
    estimate.round().max(0.0) as u64
}

fn format_number(value: f64, format: &str) -> String {
    let decimals = format.split('.').nth(1).map(|frac| frac.chars().filter(|c| *c == '0' || *c == '#').count()).unwrap_or(0);
    format!("{value:.decimals$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::value::Document;
    use serde_json::json;

    fn fixture() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_index("products");
        let rows = [
            ("prod1", "electronics", 1299.99),
            ("prod2", "electronics", 899.99),
            ("prod3", "electronics", 199.99),
            ("prod4", "electronics", 129.99),
            ("prod5", "sports", 49.99),
            ("prod6", "sports", 79.99),
            ("prod7", "home", 59.99),
            ("prod8", "home", 499.99),
        ];
        for (id, category, price) in rows {
            engine
                .index_document("products", id, Document::from_source("products", id, json!({"category": category, "price": price})))
                .unwrap();
        }
        engine
    }

    #[test]
    fn terms_aggregation_counts_categories() {
        let engine = fixture();
        let executor = AggExecutor::new("products", &engine);
        let nodes = vec![AggNode { name: "categories".into(), kind: AggKind::Terms { field: "category".into(), size: 10 }, sub_aggs: vec![] }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        let buckets = result["categories"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 3);
        let total: u64 = buckets.iter().map(|b| b["doc_count"].as_u64().unwrap()).sum();
        assert_eq!(total, 8);
    }

    #[test]
    fn avg_price_matches_expected_value() {
        let engine = fixture();
        let executor = AggExecutor::new("products", &engine);
        let nodes = vec![AggNode { name: "avg_price".into(), kind: AggKind::Avg { field: "price".into() }, sub_aggs: vec![] }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        let value = result["avg_price"]["value"].as_f64().unwrap();
        assert!((value - 402.49).abs() < 1.0, "got {value}");
    }

    #[test]
    fn nested_terms_then_avg_price_matches_per_bucket() {
        let engine = fixture();
        let executor = AggExecutor::new("products", &engine);
        let nodes = vec![AggNode {
            name: "categories".into(),
            kind: AggKind::Terms { field: "category".into(), size: 10 },
            sub_aggs: vec![AggNode { name: "avg_price".into(), kind: AggKind::Avg { field: "price".into() }, sub_aggs: vec![] }],
        }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        let buckets = result["categories"]["buckets"].as_array().unwrap();
        let electronics = buckets.iter().find(|b| b["key"] == json!("electronics")).unwrap();
        let avg = electronics["avg_price"]["value"].as_f64().unwrap();
        assert!((avg - 724.99).abs() < 10.0, "got {avg}");
    }

    #[test]
    fn filter_bucket_scopes_sub_aggregation() {
        let engine = fixture();
        let executor = AggExecutor::new("products", &engine);
        let filter = QueryNode::Term { field: "category".into(), value: Value::String("electronics".into()), boost: 1.0 };
        let nodes = vec![AggNode {
            name: "electronics_only".into(),
            kind: AggKind::FilterBucket { query: filter },
            sub_aggs: vec![AggNode { name: "avg_price".into(), kind: AggKind::Avg { field: "price".into() }, sub_aggs: vec![] }],
        }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        assert_eq!(result["electronics_only"]["doc_count"], json!(4));
        let avg = result["electronics_only"]["avg_price"]["value"].as_f64().unwrap();
        assert!((avg - 724.99).abs() < 1.0, "got {avg}");
    }

    #[test]
    fn composite_missing_bucket_keeps_docs_without_the_source_field() {
        let engine = MemoryEngine::new();
        engine.create_index("products");
        engine.index_document("products", "p1", Document::from_source("products", "p1", json!({"category": "electronics", "brand": "acme"}))).unwrap();
        engine.index_document("products", "p2", Document::from_source("products", "p2", json!({"category": "electronics"}))).unwrap();

        let executor = AggExecutor::new("products", &engine);
        let sources = vec![
            super::plan::CompositeSource { name: "brand".into(), field: "brand".into(), missing_bucket: true },
        ];
        let nodes = vec![AggNode { name: "by_brand".into(), kind: AggKind::Composite { sources, size: 10, after_key: None }, sub_aggs: vec![] }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        let buckets = result["by_brand"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        let null_bucket = buckets.iter().find(|b| b["key"]["brand"].is_null()).expect("missing bucket present");
        assert_eq!(null_bucket["doc_count"], json!(1));
    }

    #[test]
    fn range_buckets_count_price_tiers() {
        let engine = fixture();
        let executor = AggExecutor::new("products", &engine);
        let ranges = vec![
            UserRange { from: None, to: Some(100.0), key: None },
            UserRange { from: Some(100.0), to: Some(500.0), key: None },
            UserRange { from: Some(500.0), to: None, key: None },
        ];
        let nodes = vec![AggNode { name: "price_ranges".into(), kind: AggKind::NumericRange { field: "price".into(), ranges }, sub_aggs: vec![] }];
        let result = executor.execute(&nodes, &QueryNode::match_all()).unwrap();
        let buckets = result["price_ranges"]["buckets"].as_array().unwrap();
        let counts: Vec<u64> = buckets.iter().map(|b| b["doc_count"].as_u64().unwrap()).collect();
        assert_eq!(counts, vec![3, 3, 2]);
    }
}
